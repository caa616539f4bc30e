use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 토큰 신뢰 설정
///
/// `secret`(대칭 키)과 `authority`(OIDC 발급자) 중 하나를 사용합니다. 둘 다 있으면
/// `secret`이 서명 검증에 쓰이고 `authority`는 기본 발급자로만 쓰입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    #[serde(default)]
    pub authority: Option<String>,

    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub audience: String,

    /// 허용 발급자 목록 (비어 있으면 `authority` 하나)
    #[serde(default)]
    pub accepted_issuers: Vec<String>,

    /// 만료/시작 시각 허용 오차 (초)
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// 서명 키 주기적 갱신 간격 (초)
    #[serde(default = "default_metadata_refresh_secs")]
    pub metadata_refresh_secs: u64,

    /// 메타데이터 요청 제한 시간 (초)
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,

    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: u64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

fn default_metadata_refresh_secs() -> u64 {
    3600
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

fn default_backoff_initial_secs() -> u64 {
    1
}

fn default_backoff_max_secs() -> u64 {
    300
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            authority: None,
            secret: None,
            audience: String::new(),
            accepted_issuers: Vec::new(),
            clock_skew_secs: 0,
            metadata_refresh_secs: default_metadata_refresh_secs(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

impl TrustConfig {
    pub fn issuers(&self) -> Vec<String> {
        if !self.accepted_issuers.is_empty() {
            return self.accepted_issuers.clone();
        }
        self.authority
            .iter()
            .map(|authority| authority.trim_end_matches('/').to_string())
            .collect()
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    pub fn metadata_refresh(&self) -> Duration {
        Duration::from_secs(self.metadata_refresh_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        let has_secret = self.secret.as_deref().is_some_and(|s| !s.is_empty());
        let has_authority = self.authority.as_deref().is_some_and(|a| !a.trim().is_empty());

        if !has_secret && !has_authority {
            return Err("auth.authority 또는 auth.secret 중 하나는 필요합니다".to_string());
        }
        if self.audience.trim().is_empty() {
            return Err("auth.audience가 설정되지 않았습니다".to_string());
        }
        if self.issuers().is_empty() {
            return Err("auth.accepted_issuers가 비어 있고 authority도 없습니다".to_string());
        }
        if let Some(authority) = self.authority.as_deref().filter(|_| has_authority && !has_secret) {
            url::Url::parse(authority).map_err(|e| format!("auth.authority가 올바른 URL이 아닙니다: {}", e))?;
        }
        if self.backoff_initial_secs == 0 || self.backoff_max_secs < self.backoff_initial_secs {
            return Err("auth 재시도 간격 설정이 올바르지 않습니다".to_string());
        }
        Ok(())
    }
}
