use crate::proxy::ProxyError;

/// 파이프라인 안에서 처리되지 못한 오류
///
/// 각 단계가 스스로 처리할 수 있는 실패(인증 실패, 속도 제한 초과 등)는
/// 응답으로 변환되고, 여기에 해당하는 오류만 장애 변환기까지 전파됩니다.
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("설정 오류: {0}")]
    Config(String),

    #[error("처리 오류: {0}")]
    Processing(String),

    #[error("미들웨어 {middleware} 실행 실패: {message}")]
    Execution {
        middleware: String,
        message: String,
    },

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Hyper(#[from] hyper::Error),

    #[error(transparent)]
    Http(#[from] hyper::http::Error),
}
