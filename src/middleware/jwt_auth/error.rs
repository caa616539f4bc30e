/// 토큰 검증 실패
///
/// `Authentication`의 사유는 클라이언트에게 그대로 전달되므로 키 내용이나
/// 내부 오류 문자열을 담지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Authentication(String),

    #[error("서명 키 조회 실패: {0}")]
    KeyResolution(String),
}

impl AuthError {
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication(reason.into())
    }

    pub fn key_resolution(reason: impl Into<String>) -> Self {
        Self::KeyResolution(reason.into())
    }
}
