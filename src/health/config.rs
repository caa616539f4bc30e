use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamService {
    pub name: String,
    /// 점검할 URL (예: `http://agrosolutions-gestao-api/health`)
    pub url: String,
}

impl DownstreamService {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_services")]
    pub services: Vec<DownstreamService>,

    /// 서비스별 점검 제한 시간 (초)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_services() -> Vec<DownstreamService> {
    vec![
        DownstreamService::new("Gestao API", "http://agrosolutions-gestao-api/health"),
        DownstreamService::new("Ingestao API", "http://agrosolutions-ingestao-api/health"),
        DownstreamService::new("Telemetria API", "http://agrosolutions-telemetria-api/health"),
    ]
}

fn default_probe_timeout_secs() -> u64 {
    5
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            services: default_services(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl HealthSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.probe_timeout_secs == 0 {
            return Err("health.probe_timeout_secs는 0보다 커야 합니다".to_string());
        }
        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(format!("이름 없는 다운스트림 서비스: {}", service.url));
            }
            // 보고서의 data는 이름으로 구분됩니다.
            if !names.insert(service.name.as_str()) {
                return Err(format!("다운스트림 서비스 이름이 중복됩니다: {}", service.name));
            }
            let url = url::Url::parse(&service.url)
                .map_err(|e| format!("{}의 점검 URL이 올바르지 않습니다: {}", service.name, e))?;
            if url.scheme() != "http" {
                return Err(format!("{}의 점검 URL은 http여야 합니다", service.name));
            }
        }
        Ok(())
    }
}
