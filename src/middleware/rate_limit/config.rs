use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_POLICY: &str = "default";
pub const INGEST_POLICY: &str = "ingest";
pub const READ_POLICY: &str = "read";

/// 할당량 계산 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

/// 파티션 키를 고르는 기준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartitionBy {
    /// 호출자 IP
    #[default]
    ClientIp,
    /// 검증된 토큰의 subject (없으면 호출자 IP)
    Subject,
}

/// 정책 하나의 설정
///
/// `permit_limit`은 고정/슬라이딩 윈도우에서는 윈도우당 허가 수, 토큰 버킷에서는
/// 버킷 용량입니다. `window_secs`는 토큰 버킷에서 보충 주기로 쓰입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub algorithm: Algorithm,

    pub permit_limit: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// 슬라이딩 윈도우 구간 수
    #[serde(default = "default_segments")]
    pub segments_per_window: u32,

    /// 토큰 버킷 주기당 보충량
    #[serde(default)]
    pub tokens_per_period: u32,

    /// 대기열 길이 (FIFO)
    #[serde(default)]
    pub queue_limit: u32,

    #[serde(default)]
    pub partition_by: PartitionBy,
}

fn default_window_secs() -> u64 {
    60
}

fn default_segments() -> u32 {
    6
}

impl PolicyConfig {
    /// 전역 기본 정책: 고정 윈도우 100회/60초, 대기열 2
    pub fn default_policy() -> Self {
        Self {
            algorithm: Algorithm::FixedWindow,
            permit_limit: 100,
            window_secs: 60,
            segments_per_window: default_segments(),
            tokens_per_period: 0,
            queue_limit: 2,
            partition_by: PartitionBy::ClientIp,
        }
    }

    /// 수집 경로용: 슬라이딩 윈도우 1000회/60초 (6구간), 대기열 10
    pub fn ingest_policy() -> Self {
        Self {
            algorithm: Algorithm::SlidingWindow,
            permit_limit: 1000,
            window_secs: 60,
            segments_per_window: 6,
            tokens_per_period: 0,
            queue_limit: 10,
            partition_by: PartitionBy::ClientIp,
        }
    }

    /// 조회 경로용: 토큰 버킷 500개, 60초마다 100개 보충, 대기열 5
    pub fn read_policy() -> Self {
        Self {
            algorithm: Algorithm::TokenBucket,
            permit_limit: 500,
            window_secs: 60,
            segments_per_window: default_segments(),
            tokens_per_period: 100,
            queue_limit: 5,
            partition_by: PartitionBy::Subject,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// 소진된 파티션이 새로 만든 파티션과 같은 상태로 돌아오기까지 걸리는 시간
    ///
    /// 토큰 버킷은 빈 버킷이 가득 찰 때까지의 보충 주기 수만큼 걸립니다.
    pub fn recovery_secs(&self) -> u64 {
        match self.algorithm {
            Algorithm::FixedWindow | Algorithm::SlidingWindow => self.window_secs,
            Algorithm::TokenBucket => {
                let periods = self.permit_limit.div_ceil(self.tokens_per_period.max(1));
                self.window_secs.saturating_mul(u64::from(periods))
            }
        }
    }

    pub fn validate(&self, name: &str) -> Result<(), String> {
        if self.permit_limit == 0 {
            return Err(format!("정책 {}: permit_limit은 0보다 커야 합니다", name));
        }
        if self.window_secs == 0 {
            return Err(format!("정책 {}: window_secs는 0보다 커야 합니다", name));
        }
        match self.algorithm {
            Algorithm::SlidingWindow if self.segments_per_window == 0 => {
                Err(format!("정책 {}: segments_per_window는 0보다 커야 합니다", name))
            }
            Algorithm::TokenBucket if self.tokens_per_period == 0 => {
                Err(format!("정책 {}: tokens_per_period는 0보다 커야 합니다", name))
            }
            _ => Ok(()),
        }
    }
}

/// 속도 제한 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// 기본 정책을 덮어쓰거나 새 정책을 추가합니다.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyConfig>,

    /// 메모리에 유지할 최대 파티션 수
    #[serde(default = "default_max_partitions")]
    pub max_partitions: usize,

    /// 이 시간 동안 쓰이지 않은 파티션은 제거됩니다.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_partitions() -> usize {
    10_000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            policies: BTreeMap::new(),
            max_partitions: default_max_partitions(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RateLimitConfig {
    /// 기본 정책 세 가지 위에 설정된 정책을 덮어쓴 결과
    pub fn resolved_policies(&self) -> BTreeMap<String, PolicyConfig> {
        let mut policies = BTreeMap::from([
            (DEFAULT_POLICY.to_string(), PolicyConfig::default_policy()),
            (INGEST_POLICY.to_string(), PolicyConfig::ingest_policy()),
            (READ_POLICY.to_string(), PolicyConfig::read_policy()),
        ]);
        policies.extend(self.policies.clone());
        policies
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_partitions == 0 {
            return Err("rate_limit.max_partitions는 0보다 커야 합니다".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("rate_limit.sweep_interval_secs는 0보다 커야 합니다".to_string());
        }
        for (name, policy) in &self.policies {
            policy.validate(name)?;
        }

        // 회복 전에 파티션을 지우면 윈도우 도중에 할당량이 다시 채워집니다.
        let slowest = self
            .resolved_policies()
            .into_iter()
            .max_by_key(|(_, policy)| policy.recovery_secs());
        if let Some((name, policy)) = slowest {
            if self.idle_timeout_secs < policy.recovery_secs() {
                return Err(format!(
                    "rate_limit.idle_timeout_secs({})는 정책 {}의 회복 시간({}초) 이상이어야 합니다",
                    self.idle_timeout_secs,
                    name,
                    policy.recovery_secs()
                ));
            }
        }
        Ok(())
    }
}
