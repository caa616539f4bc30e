use std::sync::Arc;

use async_trait::async_trait;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::StatusCode;
use serde::Serialize;
use tracing::warn;

use super::error::AuthError;
use super::verifier::TokenVerifier;
use crate::middleware::response::json_response;
use crate::middleware::{Middleware, MiddlewareError, Next, Request, Response};
use crate::routes::RouteTable;

#[derive(Debug, Serialize)]
struct AuthFailureBody<'a> {
    error: &'a str,
    message: &'a str,
}

/// `Authorization` 헤더에서 베어러 토큰을 꺼냅니다. 스킴 이름은 대소문자를 가리지 않습니다.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// JWT 인증 미들웨어
///
/// 인증이 필요 없는 경로는 그대로 통과시킵니다.
pub struct JwtAuthMiddleware {
    verifier: Arc<TokenVerifier>,
    routes: Arc<RouteTable>,
}

impl JwtAuthMiddleware {
    pub fn new(verifier: Arc<TokenVerifier>, routes: Arc<RouteTable>) -> Self {
        Self { verifier, routes }
    }

    fn unauthorized(reason: &str, token_present: bool) -> Response {
        let mut response = json_response(
            StatusCode::UNAUTHORIZED,
            &AuthFailureBody {
                error: "Unauthorized",
                message: reason,
            },
        );

        let challenge = if token_present {
            format!(
                "Bearer error=\"invalid_token\", error_description=\"{}\"",
                reason.replace('"', "'")
            )
        } else {
            "Bearer".to_string()
        };
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }

    fn unavailable() -> Response {
        json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            &AuthFailureBody {
                error: "Service Unavailable",
                message: "Unable to validate credentials at this time.",
            },
        )
    }
}

#[async_trait]
impl Middleware for JwtAuthMiddleware {
    fn name(&self) -> &str {
        "jwt-auth"
    }

    async fn handle(&self, mut req: Request, next: Next<'_>) -> Result<Response, MiddlewareError> {
        let path = req.uri().path().to_string();
        if !self.routes.requires_authentication(&path) {
            return next.run(req).await;
        }

        let Some(token) = bearer_token(req.headers()) else {
            let reason = "Bearer token is missing";
            warn!(path = %path, reason, "JWT authentication failed: {}", reason);
            return Ok(Self::unauthorized(reason, false));
        };

        match self.verifier.verify(&token).await {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
                next.run(req).await
            }
            Err(AuthError::Authentication(reason)) => Ok(Self::unauthorized(&reason, true)),
            Err(AuthError::KeyResolution(_)) => Ok(Self::unavailable()),
        }
    }
}
