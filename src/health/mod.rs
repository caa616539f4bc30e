//! 다운스트림 헬스 집계
//!
//! 설정된 서비스들을 동시에 점검하고 `Healthy`/`Degraded` 판정을 만듭니다.
//! 결과는 캐시하지 않고 호출마다 새로 계산합니다.

mod aggregator;
mod checker;
mod config;

pub use aggregator::{DownstreamHealthAggregator, HealthReport, HealthStatus, ServiceHealth};
pub use checker::{HealthChecker, HttpHealthChecker, ProbeError};
pub use config::{DownstreamService, HealthSettings};
