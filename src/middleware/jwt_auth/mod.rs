//! JWT 베어러 인증
//!
//! 보호된 라우트의 `Authorization: Bearer` 토큰을 검증하고, 검증된 호출자 정보를
//! 요청 확장에 넣어 다운스트림으로 넘깁니다.

mod config;
mod error;
mod identity;
pub mod keys;
mod middleware;
mod verifier;

pub use config::TrustConfig;
pub use error::AuthError;
pub use identity::{Claim, VerifiedIdentity, SCOPE_CLAIM, SUBJECT_CLAIM};
pub use keys::{JwksCache, KeySet, KeySource, OidcDiscovery};
pub use middleware::{bearer_token, JwtAuthMiddleware};
pub use verifier::TokenVerifier;
