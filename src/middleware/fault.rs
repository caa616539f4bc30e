use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::error;

use crate::settings::Environment;
use super::response::{json_response, pretty_json_response};
use super::{Middleware, MiddlewareError, Next, Request, RequestScope, Response};

pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred while processing your request.";

/// 처리되지 않은 실패에 대한 표준 오류 본문
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub message: String,
    pub details: Option<String>,
    pub timestamp: String,
    pub path: String,
    pub correlation_id: Option<String>,
}

/// 파이프라인 하위에서 빠져나온 오류와 패닉을 표준 500 응답으로 바꾸는 미들웨어
#[derive(Debug, Clone)]
pub struct FaultTranslatorMiddleware {
    environment: Environment,
}

impl FaultTranslatorMiddleware {
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    fn error_response(&self, path: String, correlation_id: Option<String>, diagnostics: String) -> Response {
        let body = ErrorResponse {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: GENERIC_ERROR_MESSAGE.to_string(),
            details: self.environment.is_development().then_some(diagnostics),
            timestamp: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            path,
            correlation_id,
        };

        if self.environment.is_development() {
            pretty_json_response(StatusCode::INTERNAL_SERVER_ERROR, &body)
        } else {
            json_response(StatusCode::INTERNAL_SERVER_ERROR, &body)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "알 수 없는 패닉".to_string()
    }
}

#[async_trait]
impl Middleware for FaultTranslatorMiddleware {
    fn name(&self) -> &str {
        "fault-translator"
    }

    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let path = req.uri().path().to_string();
        let scope = RequestScope::from_request(&req);

        let (message, diagnostics) = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(e)) => (e.to_string(), format!("{:?}", e)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                (message.clone(), format!("panic: {}", message))
            }
        };

        let correlation_id = scope
            .as_ref()
            .and_then(|scope| scope.correlation_id())
            .map(str::to_string);

        error!(
            path = %path,
            correlation_id = correlation_id.as_deref().unwrap_or("-"),
            diagnostics = %diagnostics,
            "Unhandled exception occurred: {}",
            message
        );

        Ok(self.error_response(path, correlation_id, diagnostics))
    }
}
