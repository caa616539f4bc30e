pub mod access_log;
pub mod chain;
pub mod context;
pub mod correlation;
pub mod cors;
pub mod error;
pub mod fault;
pub mod jwt_auth;
pub mod rate_limit;
pub mod response;
pub mod traits;

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::Full;

/// 파이프라인을 통과하는 요청 본문 타입
pub type Body = UnsyncBoxBody<Bytes, hyper::Error>;

pub type Request = hyper::Request<Body>;
pub type Response = hyper::Response<Full<Bytes>>;

pub use access_log::AccessLogMiddleware;
pub use chain::{MiddlewareChain, Next};
pub use context::{ClientAddr, RequestScope};
pub use correlation::{CorrelationId, CorrelationMiddleware, CORRELATION_ID_HEADER};
pub use cors::{CorsConfig, CorsMiddleware};
pub use error::MiddlewareError;
pub use fault::{ErrorResponse, FaultTranslatorMiddleware};
pub use jwt_auth::{JwtAuthMiddleware, TokenVerifier, TrustConfig, VerifiedIdentity};
pub use rate_limit::{RateLimitConfig, RateLimitMiddleware, RateLimiter};
pub use traits::{Endpoint, Middleware};
