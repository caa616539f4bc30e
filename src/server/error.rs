use crate::health::ProbeError;
use crate::logging::LoggingError;
use crate::middleware::jwt_auth::AuthError;
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("설정 오류: {0}")]
    Settings(#[from] SettingsError),

    #[error("로깅 초기화 오류: {0}")]
    Logging(#[from] LoggingError),

    #[error("토큰 검증기 생성 실패: {0}")]
    Auth(#[from] AuthError),

    #[error("헬스 점검 대상 설정 오류: {0}")]
    Health(#[from] ProbeError),

    #[error("지표 등록 실패: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO 오류: {0}")]
    Io(#[from] std::io::Error),
}
