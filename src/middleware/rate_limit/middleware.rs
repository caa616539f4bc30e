use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::header::{HeaderValue, RETRY_AFTER};
use hyper::StatusCode;
use serde::Serialize;
use tracing::warn;

use super::config::PartitionBy;
use super::limiter::RateLimiter;
use super::partition::Decision;
use crate::metrics::GatewayMetrics;
use crate::middleware::jwt_auth::VerifiedIdentity;
use crate::middleware::response::json_response;
use crate::middleware::{ClientAddr, Middleware, MiddlewareError, Next, Request, Response};
use crate::routes::RouteTable;

const ANONYMOUS: &str = "anonymous";

/// 429 응답 본문
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    pub error: &'static str,
    pub message: &'static str,
    pub retry_after: Option<f64>,
}

impl RateLimitRejection {
    pub fn new(retry_after: Option<Duration>) -> Self {
        Self {
            error: "Rate limit exceeded",
            message: "Too many requests. Please try again later.",
            retry_after: retry_after.map(|d| d.as_secs_f64()),
        }
    }
}

/// Rate Limit 미들웨어
///
/// 경로로 정책을 고르고, 정책의 기준에 따라 파티션 키를 정한 뒤 입장을 판정합니다.
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    routes: Arc<RouteTable>,
    metrics: Arc<GatewayMetrics>,
    trust_forwarded_for: bool,
}

impl RateLimitMiddleware {
    pub fn new(
        limiter: Arc<RateLimiter>,
        routes: Arc<RouteTable>,
        metrics: Arc<GatewayMetrics>,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            limiter,
            routes,
            metrics,
            trust_forwarded_for,
        }
    }

    /// 호출자 IP를 추출합니다.
    fn client_ip(&self, req: &Request) -> String {
        if self.trust_forwarded_for {
            let forwarded = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if let Some(ip) = forwarded {
                return ip.to_string();
            }
        }

        ClientAddr::from_request(req)
            .map(|addr| addr.0.ip().to_string())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    fn partition_key(&self, req: &Request, partition_by: PartitionBy) -> String {
        match partition_by {
            PartitionBy::ClientIp => self.client_ip(req),
            PartitionBy::Subject => req
                .extensions()
                .get::<VerifiedIdentity>()
                .map(|identity| identity.subject.clone())
                .unwrap_or_else(|| self.client_ip(req)),
        }
    }

    fn rejection_response(retry_after: Option<Duration>) -> Response {
        let mut response = json_response(StatusCode::TOO_MANY_REQUESTS, &RateLimitRejection::new(retry_after));
        if let Some(wait) = retry_after {
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate-limit"
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let path = req.uri().path().to_string();
        let (policy_name, policy) = self.limiter.policy(self.routes.policy_for(&path));
        let policy_name = policy_name.to_string();
        let key = self.partition_key(&req, policy.partition_by);

        match self.limiter.acquire(&policy_name, &key).await {
            Decision::Admitted => next.run(req).await,
            Decision::Rejected { retry_after } => {
                self.metrics.record_rate_limit_rejection(&policy_name);
                warn!(
                    policy = %policy_name,
                    client = %key,
                    path = %path,
                    retry_after_secs = ?retry_after.map(|d| d.as_secs_f64()),
                    "Rate limit exceeded for {} on {}",
                    key, path
                );
                Ok(Self::rejection_response(retry_after))
            }
        }
    }
}
