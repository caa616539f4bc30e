use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::logging::{LogFormat, LogOutput};
use crate::settings::LogSettings;

const DEFAULT_LOG_FILE_PREFIX: &str = "gateway.log";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("로그 구독자 초기화 실패: {0}")]
    Init(String),
}

/// 전역 tracing 구독자를 설치합니다.
///
/// 반환된 guard가 drop되면 버퍼에 남은 로그가 기록되므로 `main`이 끝날 때까지
/// 유지해야 합니다.
pub fn init_logging(settings: &LogSettings) -> Result<WorkerGuard, LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(settings.level).into())
        .from_env_lossy();

    let (writer, guard) = match &settings.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::File(path) => {
            let (directory, prefix) = split_log_path(path);
            tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true);

    match settings.format {
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

/// 응답 상태 코드에 맞는 로그 심각도
///
/// 5xx는 error, 4xx는 warn, 나머지는 info입니다.
pub fn severity_for(status: u16) -> Level {
    match status {
        500.. => Level::ERROR,
        400..=499 => Level::WARN,
        _ => Level::INFO,
    }
}

/// `logs/gateway.log` 같은 경로를 (디렉터리, 파일 접두어)로 나눕니다.
fn split_log_path(path: &str) -> (String, String) {
    let path = Path::new(path);
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_LOG_FILE_PREFIX.to_string());
    (directory, prefix)
}
