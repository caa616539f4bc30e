use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::config::{PolicyConfig, RateLimitConfig, DEFAULT_POLICY};
use super::partition::Decision;
use super::store::{PartitionKey, PartitionStore};

/// 정책 이름과 파티션 키로 요청의 입장을 판정합니다.
#[derive(Debug)]
pub struct RateLimiter {
    default_policy: PolicyConfig,
    policies: HashMap<String, PolicyConfig>,
    store: PartitionStore,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let mut policies: HashMap<String, PolicyConfig> = config.resolved_policies().into_iter().collect();
        let default_policy = policies
            .remove(DEFAULT_POLICY)
            .unwrap_or_else(PolicyConfig::default_policy);

        info!(
            policies = ?policies.keys().collect::<Vec<_>>(),
            max_partitions = config.max_partitions,
            "속도 제한기 초기화"
        );

        Self {
            default_policy,
            policies,
            store: PartitionStore::new(config.max_partitions),
            idle_timeout: config.idle_timeout(),
            sweep_interval: config.sweep_interval(),
        }
    }

    /// 이름으로 정책을 찾습니다. 알 수 없는 이름은 기본 정책으로 처리합니다.
    pub fn policy(&self, name: &str) -> (&str, &PolicyConfig) {
        match self.policies.get_key_value(name) {
            Some((name, policy)) => (name.as_str(), policy),
            None => (DEFAULT_POLICY, &self.default_policy),
        }
    }

    pub async fn acquire(&self, policy: &str, key: &str) -> Decision {
        let (policy_name, policy) = self.policy(policy);
        let partition = self
            .store
            .get_or_create(PartitionKey::new(policy_name, key), policy);
        let decision = partition.acquire().await;
        debug!(policy = %policy_name, key = %key, ?decision, "입장 판정");
        decision
    }

    pub fn partition_count(&self) -> usize {
        self.store.len()
    }

    pub fn evict_idle(&self) -> usize {
        self.store.evict_idle(self.idle_timeout)
    }

    /// 주기적으로 유휴 파티션을 정리하는 작업을 띄웁니다.
    pub fn spawn_eviction(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.sweep_interval);
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.evict_idle();
            }
        })
    }
}
