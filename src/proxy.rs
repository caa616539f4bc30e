//! 업스트림 포워더
//!
//! 게이트웨이가 직접 처리하지 않는 요청을 라우트의 업스트림으로 넘깁니다.
//! 상관관계 ID와 검증된 subject는 헤더로 함께 전달됩니다.

use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{StatusCode, Uri};
use hyper_util::client::legacy;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use tracing::{debug, warn};

use crate::middleware::jwt_auth::VerifiedIdentity;
use crate::middleware::response::json_response;
use crate::middleware::{Body, CorrelationId, Request, Response, CORRELATION_ID_HEADER};
use crate::routes::RouteConfig;

pub const AUTHENTICATED_SUBJECT_HEADER: &str = "x-authenticated-subject";

/// 프록시 전달 과정에서 응답으로 바꿀 수 없는 오류
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("잘못된 업스트림 주소 {address}: {reason}")]
    InvalidUpstream { address: String, reason: String },

    #[error("업스트림 요청 생성 실패: {0}")]
    Build(#[from] hyper::http::Error),
}

/// 라우트가 정해진 요청을 실제 서비스로 넘기는 쪽
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, req: Request, route: &RouteConfig) -> Result<Response, ProxyError>;
}

#[derive(Debug, Serialize)]
struct GatewayFailure<'a> {
    error: &'a str,
    message: String,
}

/// hop-by-hop 헤더는 전달하지 않습니다.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// HTTP/1 업스트림 포워더
#[derive(Clone)]
pub struct HttpForwarder {
    client: legacy::Client<HttpConnector, Body>,
    default_upstream: Option<String>,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(default_upstream: Option<String>, timeout: Duration) -> Self {
        let connector = HttpConnector::new();
        let client = legacy::Client::builder(TokioExecutor::new()).build::<_, Body>(connector);

        Self {
            client,
            default_upstream,
            timeout,
        }
    }

    fn target_uri(base: &str, req: &Request) -> Result<Uri, ProxyError> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        format!("{}{}", base.trim_end_matches('/'), path_and_query)
            .parse::<Uri>()
            .map_err(|e| ProxyError::InvalidUpstream {
                address: base.to_string(),
                reason: e.to_string(),
            })
    }

    fn build_upstream_request(base: &str, req: Request) -> Result<Request, ProxyError> {
        let uri = Self::target_uri(base, &req)?;
        let correlation_id = CorrelationId::from_request(&req);
        let subject = req
            .extensions()
            .get::<VerifiedIdentity>()
            .map(|identity| identity.subject.clone());

        let (parts, body) = req.into_parts();
        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        // 클라이언트가 보낸 값은 신뢰하지 않습니다.
        headers.remove(AUTHENTICATED_SUBJECT_HEADER);

        if let Some(subject) = subject.and_then(|s| HeaderValue::from_str(&s).ok()) {
            headers.insert(HeaderName::from_static(AUTHENTICATED_SUBJECT_HEADER), subject);
        }
        if let Some(id) = correlation_id.and_then(|id| HeaderValue::from_str(id.as_str()).ok()) {
            headers.insert(HeaderName::from_static(CORRELATION_ID_HEADER), id);
        }

        let mut upstream_req = hyper::Request::builder()
            .method(parts.method)
            .uri(uri)
            .body(body)?;
        *upstream_req.headers_mut() = headers;
        Ok(upstream_req)
    }

    fn failure(status: StatusCode, message: String) -> Response {
        let error = status.canonical_reason().unwrap_or("Upstream Error");
        json_response(status, &GatewayFailure { error, message })
    }
}

#[async_trait]
impl Upstream for HttpForwarder {
    async fn forward(&self, req: Request, route: &RouteConfig) -> Result<Response, ProxyError> {
        let Some(base) = route.upstream.as_deref().or(self.default_upstream.as_deref()) else {
            warn!(service = %route.service, "업스트림이 설정되지 않은 라우트");
            return Ok(Self::failure(
                StatusCode::BAD_GATEWAY,
                format!("No upstream configured for {}", route.service),
            ));
        };

        let upstream_req = Self::build_upstream_request(base, req)?;
        debug!(service = %route.service, target = %upstream_req.uri(), "업스트림으로 요청 전달");

        let res = match tokio::time::timeout(self.timeout, self.client.request(upstream_req)).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) => {
                warn!(service = %route.service, error = %e, "업스트림 요청 실패");
                return Ok(Self::failure(
                    StatusCode::BAD_GATEWAY,
                    format!("{} is unavailable", route.service),
                ));
            }
            Err(_) => {
                warn!(service = %route.service, timeout_secs = self.timeout.as_secs(), "업스트림 응답 시간 초과");
                return Ok(Self::failure(
                    StatusCode::GATEWAY_TIMEOUT,
                    format!("{} did not respond in time", route.service),
                ));
            }
        };

        let (mut parts, body) = res.into_parts();
        match body.collect().await {
            Ok(collected) => {
                strip_hop_by_hop(&mut parts.headers);
                Ok(hyper::Response::from_parts(parts, Full::new(collected.to_bytes())))
            }
            Err(e) => {
                warn!(service = %route.service, error = %e, "업스트림 응답 본문 수신 실패");
                Ok(Self::failure(
                    StatusCode::BAD_GATEWAY,
                    format!("{} returned an incomplete response", route.service),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::response::empty_body;

    #[test]
    fn test_upstream_request_headers() {
        let mut req = hyper::Request::builder()
            .uri("/gestao/fazendas?page=2")
            .header(AUTHENTICATED_SUBJECT_HEADER, "forged")
            .header(header::CONNECTION, "keep-alive")
            .header("x-custom", "1")
            .body(empty_body())
            .unwrap();
        req.extensions_mut().insert(CorrelationId("corr-1".to_string()));
        req.extensions_mut().insert(VerifiedIdentity::new("user-7"));

        let upstream = HttpForwarder::build_upstream_request("http://backend:8080/", req).unwrap();

        assert_eq!(upstream.uri(), "http://backend:8080/gestao/fazendas?page=2");
        assert_eq!(upstream.headers().get(AUTHENTICATED_SUBJECT_HEADER).unwrap(), "user-7");
        assert_eq!(upstream.headers().get(CORRELATION_ID_HEADER).unwrap(), "corr-1");
        assert_eq!(upstream.headers().get("x-custom").unwrap(), "1");
        assert!(upstream.headers().get(header::CONNECTION).is_none());
    }

    #[test]
    fn test_forged_subject_removed_without_identity() {
        let req = hyper::Request::builder()
            .uri("/dashboard")
            .header(AUTHENTICATED_SUBJECT_HEADER, "forged")
            .body(empty_body())
            .unwrap();

        let upstream = HttpForwarder::build_upstream_request("http://backend", req).unwrap();
        assert!(upstream.headers().get(AUTHENTICATED_SUBJECT_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let forwarder = HttpForwarder::new(Some("http://127.0.0.1:1".to_string()), Duration::from_secs(5));
        let route = crate::routes::default_routes().remove(0);
        let req = hyper::Request::builder().uri("/gestao").body(empty_body()).unwrap();

        let res = forwarder.forward(req, &route).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
