use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::config::PolicyConfig;
use super::partition::Partition;

/// 상한에 닿았을 때 제거 대상을 고르려고 살펴보는 파티션 수
const EVICTION_SAMPLE: usize = 32;

/// 파티션 저장소의 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub policy: String,
    pub key: String,
}

impl PartitionKey {
    pub fn new(policy: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            key: key.into(),
        }
    }
}

/// 파티션 상태 저장소
///
/// 샤드 단위로 잠기는 동시성 맵 위에 파티션별 잠금을 둡니다. 전역 잠금은 없습니다.
/// 크기가 상한에 닿으면 일부 파티션을 표본으로 골라 그중 가장 오래 쓰이지 않은
/// 유휴 파티션을 제거합니다. 요청 경로에서 맵 전체를 훑지 않습니다.
#[derive(Debug)]
pub struct PartitionStore {
    partitions: DashMap<PartitionKey, Arc<Partition>>,
    max_partitions: usize,
}

impl PartitionStore {
    pub fn new(max_partitions: usize) -> Self {
        Self {
            partitions: DashMap::new(),
            max_partitions: max_partitions.max(1),
        }
    }

    pub fn get_or_create(&self, key: PartitionKey, policy: &PolicyConfig) -> Arc<Partition> {
        if let Some(existing) = self.partitions.get(&key) {
            return Arc::clone(existing.value());
        }

        if self.partitions.len() >= self.max_partitions {
            self.evict_least_recently_used();
        }

        let entry = self
            .partitions
            .entry(key)
            .or_insert_with(|| Arc::new(Partition::new(policy, Instant::now())));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.partitions.contains_key(key)
    }

    /// 사용 중이 아닌 파티션인지 (대기자도, 진행 중인 획득도 없음)
    fn is_unused(partition: &Arc<Partition>) -> bool {
        Arc::strong_count(partition) == 1 && !partition.has_waiters()
    }

    /// `idle_timeout` 이상 쓰이지 않은 파티션을 제거하고 제거한 개수를 반환합니다.
    pub fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let now = Instant::now();
        let before = self.partitions.len();
        self.partitions
            .retain(|_, partition| !(Self::is_unused(partition) && partition.is_idle(now, idle_timeout)));
        let evicted = before.saturating_sub(self.partitions.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.partitions.len(), "유휴 파티션 제거");
        }
        evicted
    }

    fn evict_least_recently_used(&self) {
        let victim = self
            .partitions
            .iter()
            .take(EVICTION_SAMPLE)
            .filter(|entry| Self::is_unused(entry.value()))
            .min_by_key(|entry| entry.value().last_used())
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.partitions
                .remove_if(&key, |_, partition| Self::is_unused(partition));
            debug!(policy = %key.policy, key = %key.key, "파티션 상한 도달, LRU 파티션 제거");
        }
    }
}
