//! Rate Limiting 미들웨어
//!
//! 요청마다 정책 이름과 파티션 키를 정하고, 파티션 상태에 따라 허용, 대기,
//! 거절 중 하나로 판정합니다. 정책은 고정 윈도우, 슬라이딩 윈도우, 토큰 버킷을
//! 지원합니다.

pub mod algorithm;
mod config;
mod limiter;
mod middleware;
pub mod partition;
pub mod store;

pub use config::{
    Algorithm, PartitionBy, PolicyConfig, RateLimitConfig, DEFAULT_POLICY, INGEST_POLICY, READ_POLICY,
};
pub use limiter::RateLimiter;
pub use middleware::{RateLimitMiddleware, RateLimitRejection};
pub use partition::Decision;
