use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, StatusCode};
use tracing::debug;

use super::config::{CorsConfig, WILDCARD};
use crate::middleware::{Middleware, MiddlewareError, Next, Request, RequestScope, Response};

/// CORS 미들웨어
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    config: Arc<CorsConfig>,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    fn is_preflight(req: &Request) -> bool {
        req.method() == Method::OPTIONS
            && req.headers().contains_key(header::ORIGIN)
            && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    /// 단순 요청과 preflight 응답 모두에 붙는 헤더
    fn apply_common_headers(config: &CorsConfig, headers: &mut HeaderMap, origin: &str) {
        if !config.allows_origin(origin) {
            return;
        }

        let allow_origin = if config.allows_any_origin() && !config.allow_credentials {
            WILDCARD
        } else {
            headers.append(header::VARY, HeaderValue::from_static("Origin"));
            origin
        };
        set_header(headers, header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);

        if config.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        if !config.expose_headers.is_empty() {
            set_header(
                headers,
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                &config.expose_headers.join(", "),
            );
        }
    }

    /// Preflight 요청 처리
    ///
    /// 허용되지 않은 Origin이면 CORS 헤더 없이 204를 돌려주고, 판단은 브라우저에 맡깁니다.
    fn preflight_response(&self, origin: &str, requested_method: &str, requested_headers: Option<&str>) -> Response {
        let mut response = hyper::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NO_CONTENT;

        if !self.config.allows_origin(origin) {
            debug!(origin = %origin, "허용되지 않은 Origin의 preflight 요청");
            return response;
        }

        let headers = response.headers_mut();
        Self::apply_common_headers(&self.config, headers, origin);

        let methods = if self.config.allows_any_method() {
            requested_method.to_string()
        } else {
            self.config.allow_methods.join(", ")
        };
        set_header(headers, header::ACCESS_CONTROL_ALLOW_METHODS, &methods);

        let allow_headers = if self.config.allows_any_header() {
            requested_headers.map(str::to_string)
        } else if self.config.allow_headers.is_empty() {
            None
        } else {
            Some(self.config.allow_headers.join(", "))
        };
        if let Some(allow_headers) = allow_headers {
            set_header(headers, header::ACCESS_CONTROL_ALLOW_HEADERS, &allow_headers);
        }

        if let Some(max_age) = self.config.max_age {
            set_header(headers, header::ACCESS_CONTROL_MAX_AGE, &max_age.to_string());
        }

        response
    }
}

fn set_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

fn header_str(req: &Request, name: HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl Middleware for CorsMiddleware {
    fn name(&self) -> &str {
        "cors"
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let origin = header_str(&req, header::ORIGIN);

        if Self::is_preflight(&req) {
            let requested_method = header_str(&req, header::ACCESS_CONTROL_REQUEST_METHOD).unwrap_or_default();
            let requested_headers = header_str(&req, header::ACCESS_CONTROL_REQUEST_HEADERS);
            let origin = origin.unwrap_or_default();
            debug!(origin = %origin, method = %requested_method, "CORS preflight 요청 처리");
            return Ok(self.preflight_response(&origin, &requested_method, requested_headers.as_deref()));
        }

        let Some(origin) = origin else {
            return next.run(req).await;
        };

        // 하위 단계가 실패해 장애 변환기가 만든 응답에도 헤더가 붙도록 훅으로 등록합니다.
        let scope = RequestScope::from_request(&req);
        if let Some(scope) = &scope {
            let config = Arc::clone(&self.config);
            let hook_origin = origin.clone();
            scope.on_response_start(move |headers| {
                Self::apply_common_headers(&config, headers, &hook_origin);
            });
        }

        let mut response = next.run(req).await?;
        if scope.is_none() {
            Self::apply_common_headers(&self.config, response.headers_mut(), &origin);
        }
        Ok(response)
    }
}
