use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use hyper::StatusCode;
use serde::Serialize;
use tracing::{error, warn};

use super::checker::{HealthChecker, HttpHealthChecker, ProbeError};
use super::config::HealthSettings;
use crate::middleware::response::json_response;
use crate::middleware::Response;

const HEALTHY_DESCRIPTION: &str = "All downstream services are healthy";
const DEGRADED_DESCRIPTION: &str = "One or more downstream services are unhealthy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealth {
    pub name: String,
    pub healthy: bool,
}

/// 헬스 엔드포인트 응답 본문
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub description: String,
    pub data: BTreeMap<String, bool>,
}

impl HealthReport {
    /// 서비스가 하나라도 실패면 `Degraded`. 서비스가 없으면 `Healthy`입니다.
    pub fn from_results(results: Vec<ServiceHealth>) -> Self {
        let all_healthy = results.iter().all(|r| r.healthy);
        let data = results.into_iter().map(|r| (r.name, r.healthy)).collect();
        if all_healthy {
            Self {
                status: HealthStatus::Healthy,
                description: HEALTHY_DESCRIPTION.to_string(),
                data,
            }
        } else {
            Self {
                status: HealthStatus::Degraded,
                description: DEGRADED_DESCRIPTION.to_string(),
                data,
            }
        }
    }

    /// 게이트웨이 자신만 보는 liveness 응답
    pub fn live() -> Self {
        Self {
            status: HealthStatus::Healthy,
            description: "Gateway is running".to_string(),
            data: BTreeMap::new(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn into_response(self) -> Response {
        json_response(self.status_code(), &self)
    }
}

/// 다운스트림 서비스 헬스 집계기
///
/// 모든 점검을 동시에 실행하고, 각 점검은 자기 제한 시간 안에 끝납니다.
/// 점검 중 발생한 오류는 그 서비스의 실패로만 기록됩니다.
pub struct DownstreamHealthAggregator {
    checkers: Vec<Arc<dyn HealthChecker>>,
}

impl DownstreamHealthAggregator {
    pub fn new(checkers: Vec<Arc<dyn HealthChecker>>) -> Self {
        Self { checkers }
    }

    pub fn from_settings(settings: &HealthSettings) -> Result<Self, ProbeError> {
        let timeout = settings.probe_timeout();
        let checkers = settings
            .services
            .iter()
            .map(|service| {
                HttpHealthChecker::new(service, timeout).map(|c| Arc::new(c) as Arc<dyn HealthChecker>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(checkers))
    }

    pub fn service_count(&self) -> usize {
        self.checkers.len()
    }

    pub async fn check(&self) -> HealthReport {
        let probes = self.checkers.iter().map(|checker| async move {
            let healthy = match checker.check().await {
                Ok(true) => true,
                Ok(false) => {
                    warn!(service = %checker.name(), "Service {} is unhealthy", checker.name());
                    false
                }
                Err(e) => {
                    error!(
                        service = %checker.name(),
                        error = %e,
                        "Error checking health for {}",
                        checker.name()
                    );
                    false
                }
            };
            ServiceHealth {
                name: checker.name().to_string(),
                healthy,
            }
        });

        HealthReport::from_results(join_all(probes).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixed {
        name: &'static str,
        result: fn() -> Result<bool, ProbeError>,
    }

    #[async_trait]
    impl HealthChecker for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> Result<bool, ProbeError> {
            (self.result)()
        }
    }

    fn fixed(name: &'static str, result: fn() -> Result<bool, ProbeError>) -> Arc<dyn HealthChecker> {
        Arc::new(Fixed { name, result })
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let aggregator = DownstreamHealthAggregator::new(vec![fixed("A", || Ok(true)), fixed("B", || Ok(true))]);
        let report = aggregator.check().await;

        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.description, HEALTHY_DESCRIPTION);
        assert_eq!(report.status_code(), StatusCode::OK);
        assert_eq!(report.data.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_and_error_degrade() {
        let aggregator = DownstreamHealthAggregator::new(vec![
            fixed("A", || Ok(true)),
            fixed("B", || Ok(false)),
            fixed("C", || Err(ProbeError::Timeout(Duration::from_secs(5)))),
        ]);
        let report = aggregator.check().await;

        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.data["A"], true);
        assert_eq!(report.data["B"], false);
        assert_eq!(report.data["C"], false);
    }

    #[tokio::test]
    async fn test_no_services_is_healthy() {
        let report = DownstreamHealthAggregator::new(Vec::new()).check().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.data.is_empty());
    }

    #[test]
    fn test_report_serialization() {
        let body = serde_json::to_value(HealthReport::from_results(vec![ServiceHealth {
            name: "Gestao API".to_string(),
            healthy: false,
        }]))
        .unwrap();

        assert_eq!(body["status"], "Degraded");
        assert_eq!(body["description"], DEGRADED_DESCRIPTION);
        assert_eq!(body["data"]["Gestao API"], false);
    }
}
