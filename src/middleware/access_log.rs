use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hyper::StatusCode;
use tracing::{error, info, warn, Level};

use crate::logging::severity_for;
use crate::metrics::GatewayMetrics;
use super::correlation::inbound_correlation_id;
use super::{ClientAddr, Middleware, MiddlewareError, Next, Request, RequestScope, Response};

/// 클라이언트가 응답 전에 연결을 끊은 경우 기록하는 상태 코드
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// 요청마다 시작/완료 로그를 한 쌍씩 남기고 요청 지표를 기록하는 미들웨어
pub struct AccessLogMiddleware {
    metrics: Arc<GatewayMetrics>,
}

impl AccessLogMiddleware {
    pub fn new(metrics: Arc<GatewayMetrics>) -> Self {
        Self { metrics }
    }
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Pending,
    Responded(StatusCode),
    Failed,
}

/// 완료 로그를 drop 시점에 남기는 가드
///
/// 정상 반환, 오류 반환, 패닉, 취소(future drop) 어느 경로로 빠져나가도
/// 완료 로그는 정확히 한 번 기록됩니다.
struct CompletionLog {
    method: String,
    path: String,
    started: Instant,
    scope: Option<Arc<RequestScope>>,
    metrics: Arc<GatewayMetrics>,
    outcome: Outcome,
}

impl CompletionLog {
    fn status_code(&self) -> u16 {
        match self.outcome {
            Outcome::Responded(status) => status.as_u16(),
            Outcome::Failed => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            Outcome::Pending if std::thread::panicking() => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            Outcome::Pending => CLIENT_CLOSED_REQUEST,
        }
    }
}

impl Drop for CompletionLog {
    fn drop(&mut self) {
        let status = self.status_code();
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        self.metrics
            .record_http_request(&self.method, status, elapsed.as_secs_f64());

        let correlation_id = self
            .scope
            .as_ref()
            .and_then(|scope| scope.correlation_id())
            .unwrap_or("-");

        match severity_for(status) {
            Level::ERROR => error!(
                method = %self.method,
                path = %self.path,
                status,
                elapsed_ms,
                correlation_id,
                "Outgoing Response: {} {} responded {} in {}ms",
                self.method, self.path, status, elapsed_ms
            ),
            Level::WARN => warn!(
                method = %self.method,
                path = %self.path,
                status,
                elapsed_ms,
                correlation_id,
                "Outgoing Response: {} {} responded {} in {}ms",
                self.method, self.path, status, elapsed_ms
            ),
            _ => info!(
                method = %self.method,
                path = %self.path,
                status,
                elapsed_ms,
                correlation_id,
                "Outgoing Response: {} {} responded {} in {}ms",
                self.method, self.path, status, elapsed_ms
            ),
        }
    }
}

#[async_trait]
impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &str {
        "access-log"
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(|q| format!("?{}", q)).unwrap_or_default();
        let remote_ip = ClientAddr::from_request(&req)
            .map(|addr| addr.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        // 상관관계 단계보다 앞이라 인바운드 헤더가 있을 때만 채워집니다.
        let correlation_id = inbound_correlation_id(req.headers()).unwrap_or("-").to_string();

        info!(
            method = %method,
            path = %path,
            query = %query,
            remote_ip = %remote_ip,
            correlation_id = correlation_id.as_str(),
            "Incoming Request: {} {}{} from {}",
            method, path, query, remote_ip
        );

        let mut completion = CompletionLog {
            method,
            path,
            started: Instant::now(),
            scope: RequestScope::from_request(&req),
            metrics: Arc::clone(&self.metrics),
            outcome: Outcome::Pending,
        };

        let result = next.run(req).await;
        completion.outcome = match &result {
            Ok(response) => Outcome::Responded(response.status()),
            Err(_) => Outcome::Failed,
        };
        result
    }
}
