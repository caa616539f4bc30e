use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use super::config::{Algorithm, PolicyConfig};

/// 파티션 하나의 할당량 상태
///
/// 호출자는 파티션 잠금을 잡은 상태에서만 호출하므로 구현은 동기화를 신경 쓰지 않습니다.
pub trait QuotaAlgorithm: Send + fmt::Debug {
    /// `now`까지 경과한 시간만큼 허가를 보충합니다.
    fn replenish(&mut self, now: Instant);

    /// 허가 하나를 소비합니다. 남은 허가가 없으면 `false`.
    fn try_acquire(&mut self, now: Instant) -> bool {
        self.replenish(now);
        self.consume()
    }

    fn consume(&mut self) -> bool;

    /// 다음 허가까지 남은 시간. 알 수 없으면 `None`.
    fn retry_after(&self, now: Instant) -> Option<Duration>;

    /// 허가가 다시 생길 수 있는 가장 이른 시각
    fn next_replenishment(&self) -> Instant;
}

pub fn build(policy: &PolicyConfig, now: Instant) -> Box<dyn QuotaAlgorithm> {
    match policy.algorithm {
        Algorithm::FixedWindow => Box::new(FixedWindow::new(policy.permit_limit, policy.window(), now)),
        Algorithm::SlidingWindow => Box::new(SlidingWindow::new(
            policy.permit_limit,
            policy.window(),
            policy.segments_per_window,
            now,
        )),
        Algorithm::TokenBucket => Box::new(TokenBucket::new(
            policy.permit_limit,
            policy.tokens_per_period,
            policy.window(),
            now,
        )),
    }
}

/// 경과 시간을 주기 단위로 나눈 몫
fn elapsed_periods(since: Instant, now: Instant, period: Duration) -> u64 {
    let period = period.as_nanos().max(1);
    (now.saturating_duration_since(since).as_nanos() / period) as u64
}

fn advance(start: Instant, period: Duration, periods: u64) -> Instant {
    let nanos = period.as_nanos().saturating_mul(periods as u128);
    start + Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

#[derive(Debug)]
pub struct FixedWindow {
    limit: u32,
    window: Duration,
    window_start: Instant,
    used: u32,
}

impl FixedWindow {
    pub fn new(limit: u32, window: Duration, now: Instant) -> Self {
        Self { limit, window, window_start: now, used: 0 }
    }
}

impl QuotaAlgorithm for FixedWindow {
    fn replenish(&mut self, now: Instant) {
        let periods = elapsed_periods(self.window_start, now, self.window);
        if periods > 0 {
            self.window_start = advance(self.window_start, self.window, periods);
            self.used = 0;
        }
    }

    fn consume(&mut self) -> bool {
        if self.used < self.limit {
            self.used += 1;
            true
        } else {
            false
        }
    }

    fn retry_after(&self, now: Instant) -> Option<Duration> {
        Some(self.next_replenishment().saturating_duration_since(now))
    }

    fn next_replenishment(&self) -> Instant {
        self.window_start + self.window
    }
}

/// 윈도우를 여러 구간으로 나눠, 가장 오래된 구간이 빠질 때 그 구간의 허가를 돌려받습니다.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: u32,
    segment: Duration,
    /// 마지막 원소가 현재 구간
    counts: VecDeque<u32>,
    segment_start: Instant,
    in_window: u32,
}

impl SlidingWindow {
    pub fn new(limit: u32, window: Duration, segments: u32, now: Instant) -> Self {
        let segments = segments.max(1);
        Self {
            limit,
            segment: window / segments,
            counts: std::iter::repeat(0).take(segments as usize).collect(),
            segment_start: now,
            in_window: 0,
        }
    }
}

impl QuotaAlgorithm for SlidingWindow {
    fn replenish(&mut self, now: Instant) {
        let periods = elapsed_periods(self.segment_start, now, self.segment);
        if periods == 0 {
            return;
        }

        if periods >= self.counts.len() as u64 {
            self.counts.iter_mut().for_each(|c| *c = 0);
            self.in_window = 0;
        } else {
            for _ in 0..periods {
                let expired = self.counts.pop_front().unwrap_or(0);
                self.in_window = self.in_window.saturating_sub(expired);
                self.counts.push_back(0);
            }
        }
        self.segment_start = advance(self.segment_start, self.segment, periods);
    }

    fn consume(&mut self) -> bool {
        if self.in_window >= self.limit {
            return false;
        }
        if let Some(current) = self.counts.back_mut() {
            *current += 1;
        }
        self.in_window += 1;
        true
    }

    fn retry_after(&self, _now: Instant) -> Option<Duration> {
        None
    }

    fn next_replenishment(&self) -> Instant {
        self.segment_start + self.segment
    }
}

/// 정수 주기 단위로만 보충되는 토큰 버킷
#[derive(Debug)]
pub struct TokenBucket {
    limit: u32,
    tokens_per_period: u32,
    period: Duration,
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(limit: u32, tokens_per_period: u32, period: Duration, now: Instant) -> Self {
        Self {
            limit,
            tokens_per_period,
            period,
            tokens: limit,
            last_refill: now,
        }
    }
}

impl QuotaAlgorithm for TokenBucket {
    fn replenish(&mut self, now: Instant) {
        let periods = elapsed_periods(self.last_refill, now, self.period);
        if periods == 0 {
            return;
        }
        let refilled = (self.tokens as u64)
            .saturating_add(periods.saturating_mul(self.tokens_per_period as u64))
            .min(self.limit as u64);
        self.tokens = refilled as u32;
        self.last_refill = advance(self.last_refill, self.period, periods);
    }

    fn consume(&mut self) -> bool {
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn retry_after(&self, now: Instant) -> Option<Duration> {
        Some(self.next_replenishment().saturating_duration_since(now))
    }

    fn next_replenishment(&self) -> Instant {
        self.last_refill + self.period
    }
}
