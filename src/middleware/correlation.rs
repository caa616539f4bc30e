//! 상관관계 ID 전파
//!
//! 요청마다 하나의 추적 ID를 보장합니다. 인바운드 `X-Correlation-Id` 헤더가
//! 있으면 그대로 사용하고, 없거나 비어 있으면 새로 발급합니다. ID는 요청
//! 로깅 span과 응답 헤더에 붙습니다.

use async_trait::async_trait;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::{Middleware, MiddlewareError, Next, Request, RequestScope, Response};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// 요청 확장으로 전달되는 상관관계 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_request(req: &Request) -> Option<Self> {
        req.extensions().get::<Self>().cloned()
    }
}

/// 인바운드 헤더의 ID (없거나 공백이면 `None`)
pub fn inbound_correlation_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
}

/// 인바운드 헤더에서 ID를 읽고, 없거나 공백이면 새 UUID를 만듭니다.
pub fn resolve_correlation_id(headers: &HeaderMap) -> String {
    inbound_correlation_id(headers)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 헤더가 아직 없을 때만 상관관계 ID를 추가합니다.
fn append_if_absent(headers: &mut HeaderMap, id: &str) {
    let name = HeaderName::from_static(CORRELATION_ID_HEADER);
    if headers.contains_key(&name) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(id) {
        headers.insert(name, value);
    }
}

#[derive(Debug, Default)]
pub struct CorrelationMiddleware;

impl CorrelationMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for CorrelationMiddleware {
    fn name(&self) -> &str {
        "correlation-id"
    }

    async fn handle(&self, mut req: Request, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let correlation_id = resolve_correlation_id(req.headers());
        let scope = RequestScope::from_request(&req);

        if let Some(scope) = &scope {
            scope.set_correlation_id(correlation_id.clone());
            let header_id = correlation_id.clone();
            scope.on_response_start(move |headers| append_if_absent(headers, &header_id));
        }
        req.extensions_mut().insert(CorrelationId(correlation_id.clone()));

        let span = info_span!("request", correlation_id = %correlation_id);
        let mut response = next.run(req).instrument(span).await?;

        // 체인 밖에서 단독으로 쓰일 때는 훅이 실행되지 않으므로 직접 붙입니다.
        if scope.is_none() {
            append_if_absent(response.headers_mut(), &correlation_id);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_inbound_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "test-correlation-id".parse().unwrap());
        assert_eq!(resolve_correlation_id(&headers), "test-correlation-id");
    }

    #[test]
    fn test_generates_id_when_missing_or_blank() {
        let generated = resolve_correlation_id(&HeaderMap::new());
        assert!(Uuid::parse_str(&generated).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "   ".parse().unwrap());
        let generated = resolve_correlation_id(&headers);
        assert!(!generated.trim().is_empty());
        assert_ne!(generated, "   ");
    }

    #[test]
    fn test_existing_response_header_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_ID_HEADER, "set-by-backend".parse().unwrap());
        append_if_absent(&mut headers, "ours");
        assert_eq!(headers.get(CORRELATION_ID_HEADER).unwrap(), "set-by-backend");
        assert_eq!(headers.get_all(CORRELATION_ID_HEADER).iter().count(), 1);
    }
}
