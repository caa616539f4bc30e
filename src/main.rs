use gateway_edge::logging::init_logging;
use gateway_edge::server::ServerManager;
use gateway_edge::settings::Settings;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            std::process::exit(1);
        }
    };

    // 파일 출력은 가드가 살아 있는 동안만 기록됩니다.
    let _guard = match init_logging(&settings.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("로깅 초기화 실패: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        port = settings.server.http_port,
        environment = %settings.environment,
        "게이트웨이 설정 로드 완료"
    );

    let manager = match ServerManager::new(settings) {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "게이트웨이 구성 실패");
            std::process::exit(1);
        }
    };

    if let Err(e) = manager.start().await {
        error!(error = %e, "게이트웨이 실행 실패");
        std::process::exit(1);
    }
}
