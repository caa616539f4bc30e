use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{HeaderValue, ALLOW};
use hyper::{Method, StatusCode};
use serde::Serialize;
use tracing::debug;

use super::info::InfoService;
use crate::health::{DownstreamHealthAggregator, HealthReport};
use crate::metrics::GatewayMetrics;
use crate::middleware::response::json_response;
use crate::middleware::{Endpoint, MiddlewareError, Request, Response};
use crate::proxy::Upstream;
use crate::routes::RouteTable;

#[derive(Debug, Serialize)]
struct RouteFailure {
    error: &'static str,
    message: String,
}

/// 파이프라인 종착점
///
/// 헬스/정보/지표 엔드포인트는 직접 응답하고 나머지는 라우트 테이블을 거쳐
/// 업스트림으로 넘깁니다.
pub struct GatewayEndpoint {
    health: Arc<DownstreamHealthAggregator>,
    info: InfoService,
    metrics: Arc<GatewayMetrics>,
    routes: Arc<RouteTable>,
    upstream: Arc<dyn Upstream>,
}

impl GatewayEndpoint {
    pub fn new(
        health: Arc<DownstreamHealthAggregator>,
        info: InfoService,
        metrics: Arc<GatewayMetrics>,
        routes: Arc<RouteTable>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            health,
            info,
            metrics,
            routes,
            upstream,
        }
    }

    fn not_found(path: &str) -> Response {
        json_response(
            StatusCode::NOT_FOUND,
            &RouteFailure {
                error: "Not Found",
                message: format!("No route matches {}", path),
            },
        )
    }

    fn method_not_allowed(method: &Method, methods: &[String]) -> Response {
        let mut response = json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &RouteFailure {
                error: "Method Not Allowed",
                message: format!("{} is not allowed on this route", method),
            },
        );
        if let Ok(allow) = HeaderValue::from_str(&methods.join(", ")) {
            response.headers_mut().insert(ALLOW, allow);
        }
        response
    }
}

#[async_trait]
impl Endpoint for GatewayEndpoint {
    async fn call(&self, req: Request) -> Result<Response, MiddlewareError> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        match path.as_str() {
            "/health" | "/health/ready" => return Ok(self.health.check().await.into_response()),
            "/health/live" => return Ok(HealthReport::live().into_response()),
            "/api/info" if method == Method::GET => return Ok(self.info.info_response()),
            "/api/info/routes" if method == Method::GET => return Ok(self.info.routes_response()),
            "/metrics" if method == Method::GET => return Ok(self.metrics.response()),
            _ => {}
        }

        let Some(route) = self.routes.find(&path).cloned() else {
            debug!(path = %path, "일치하는 라우트 없음");
            return Ok(Self::not_found(&path));
        };
        if !route.allows_method(method.as_str()) {
            return Ok(Self::method_not_allowed(&method, &route.methods));
        }

        Ok(self.upstream.forward(req, &route).await?)
    }
}
