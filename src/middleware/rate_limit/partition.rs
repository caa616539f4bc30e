use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use super::algorithm::{self, QuotaAlgorithm};
use super::config::PolicyConfig;

/// 입장 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    Rejected {
        /// 다음 허가까지 남은 시간 (알고리즘이 알려줄 수 있을 때만)
        retry_after: Option<Duration>,
    },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

#[derive(Debug)]
struct PartitionState {
    algorithm: Box<dyn QuotaAlgorithm>,
    /// 대기 중인 티켓 번호 (도착 순)
    queue: VecDeque<u64>,
    queue_limit: usize,
    next_ticket: u64,
    last_used: Instant,
}

/// `(정책, 파티션 키)` 하나의 상태
///
/// 확인과 차감은 파티션 잠금 안에서 한 번에 일어납니다. 대기열은 엄격한 FIFO이며
/// 맨 앞 티켓만 허가를 가져갈 수 있습니다.
#[derive(Debug)]
pub struct Partition {
    state: Mutex<PartitionState>,
    notify: Notify,
}

impl Partition {
    pub fn new(policy: &PolicyConfig, now: Instant) -> Self {
        Self {
            state: Mutex::new(PartitionState {
                algorithm: algorithm::build(policy, now),
                queue: VecDeque::new(),
                queue_limit: policy.queue_limit as usize,
                next_ticket: 0,
                last_used: now,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PartitionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 허가를 얻거나, 대기열에서 차례를 기다리거나, 즉시 거절됩니다.
    ///
    /// 반환된 future가 대기 중에 drop되면 티켓은 대기열에서 빠집니다.
    pub async fn acquire(self: Arc<Self>) -> Decision {
        let ticket = {
            let mut state = self.lock();
            let now = Instant::now();
            state.last_used = now;

            if state.queue.is_empty() && state.algorithm.try_acquire(now) {
                return Decision::Admitted;
            }

            if state.queue.len() >= state.queue_limit {
                return Decision::Rejected {
                    retry_after: state.algorithm.retry_after(now),
                };
            }

            let id = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(id);
            QueueTicket {
                partition: Arc::clone(&self),
                id,
                waiting: true,
            }
        };

        ticket.wait().await
    }

    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn last_used(&self) -> Instant {
        self.lock().last_used
    }

    /// 대기열이 비어 있고 `idle_timeout` 동안 쓰이지 않았는지
    pub fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        let state = self.lock();
        state.queue.is_empty() && now.saturating_duration_since(state.last_used) >= idle_timeout
    }

    pub fn has_waiters(&self) -> bool {
        !self.lock().queue.is_empty()
    }
}

/// 대기열 자리 하나
///
/// drop될 때 아직 대기 중이면 대기열에서 자신을 제거하고 다음 대기자를 깨웁니다.
struct QueueTicket {
    partition: Arc<Partition>,
    id: u64,
    waiting: bool,
}

impl QueueTicket {
    async fn wait(mut self) -> Decision {
        loop {
            let notified = self.partition.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.partition.lock();
                let now = Instant::now();
                if state.queue.front() != Some(&self.id) {
                    None
                } else if state.algorithm.try_acquire(now) {
                    state.queue.pop_front();
                    state.last_used = now;
                    self.waiting = false;
                    drop(state);
                    // 새 맨 앞 티켓도 남은 허가를 확인할 수 있게 깨웁니다.
                    self.partition.notify.notify_waiters();
                    return Decision::Admitted;
                } else {
                    Some(state.algorithm.next_replenishment())
                }
            };

            // 맨 앞이 아니면 앞 티켓이 빠질 때까지 알림만 기다립니다.
            match wake_at {
                Some(wake_at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = sleep_until(wake_at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        if !self.waiting {
            return;
        }
        let mut state = self.partition.lock();
        let was_head = state.queue.front() == Some(&self.id);
        state.queue.retain(|id| *id != self.id);
        drop(state);
        if was_head {
            self.partition.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::rate_limit::config::{Algorithm, PartitionBy};

    fn policy(limit: u32, queue_limit: u32) -> PolicyConfig {
        PolicyConfig {
            algorithm: Algorithm::FixedWindow,
            permit_limit: limit,
            window_secs: 60,
            segments_per_window: 6,
            tokens_per_period: 0,
            queue_limit,
            partition_by: PartitionBy::ClientIp,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_request_admitted_after_window() {
        let partition = Arc::new(Partition::new(&policy(1, 1), Instant::now()));

        assert_eq!(Arc::clone(&partition).acquire().await, Decision::Admitted);

        let waiter = tokio::spawn(Arc::clone(&partition).acquire());
        tokio::task::yield_now().await;
        assert_eq!(partition.queued(), 1);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(waiter.await.unwrap(), Decision::Admitted);
        assert_eq!(partition.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_ticket_leaves_queue() {
        let partition = Arc::new(Partition::new(&policy(1, 1), Instant::now()));
        assert!(Arc::clone(&partition).acquire().await.is_admitted());

        let waiter = tokio::spawn(Arc::clone(&partition).acquire());
        tokio::task::yield_now().await;
        assert_eq!(partition.queued(), 1);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(partition.queued(), 0);

        // 자리가 비었으므로 새 요청이 다시 대기열에 들어갈 수 있습니다.
        let queued_again = tokio::spawn(Arc::clone(&partition).acquire());
        tokio::task::yield_now().await;
        assert_eq!(partition.queued(), 1);
        queued_again.abort();
    }
}
