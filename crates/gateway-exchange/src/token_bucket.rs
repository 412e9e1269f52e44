//! Token Bucket.
//!
//! 리필은 스케줄링하지 않고, 토큰을 확인할 때 경과 시간만큼 지연 계산합니다.

use std::time::Duration;
use tokio::time::Instant;

/// 부동소수 오차 허용치.
const EPSILON: f64 = 1e-9;

/// Token Bucket 구조체.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    /// 현재 토큰 수
    tokens: f64,
    /// 마지막 리필 시간
    last_refill: Instant,
    /// 최대 토큰 수 (버킷 용량)
    capacity: f64,
    /// 초당 리필되는 토큰 수
    refill_rate: f64,
}

impl TokenBucket {
    /// 분당 요청 수로 생성합니다. 생성 시점에 가득 찬 상태입니다.
    pub(crate) fn per_minute(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
            capacity,
            refill_rate: capacity / 60.0,
        }
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.capacity
    }

    /// 토큰 리필.
    pub(crate) fn refill(&mut self) {
        let now = Instant::now();
        self.tokens = self.available_at(now);
        self.last_refill = now;
    }

    /// 상태를 바꾸지 않고 특정 시점의 토큰 수를 계산합니다.
    pub(crate) fn available_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    /// 토큰 소비 시도. 호출 전에 `refill()`이 선행되어야 합니다.
    pub(crate) fn try_take(&mut self) -> bool {
        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            true
        } else {
            false
        }
    }

    /// 사용되지 않은 토큰 반환.
    pub(crate) fn refund(&mut self) {
        self.tokens = (self.tokens + 1.0).min(self.capacity);
    }

    /// 다음 토큰까지 대기 시간.
    pub(crate) fn time_until_next_token(&self) -> Duration {
        if self.tokens + EPSILON >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_starts_full_and_drains() {
        let mut bucket = TokenBucket::per_minute(3);
        bucket.refill();
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
        assert!((bucket.time_until_next_token().as_secs_f64() - 20.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_refill_capped_at_capacity() {
        let mut bucket = TokenBucket::per_minute(60);
        bucket.refill();
        for _ in 0..60 {
            assert!(bucket.try_take());
        }

        tokio::time::advance(Duration::from_millis(2500)).await;
        let available = bucket.available_at(Instant::now());
        assert!((available - 2.5).abs() < 1e-6);

        tokio::time::advance(Duration::from_secs(600)).await;
        bucket.refill();
        assert_eq!(bucket.available_at(Instant::now()), 60.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_does_not_exceed_capacity() {
        let mut bucket = TokenBucket::per_minute(2);
        bucket.refund();
        assert_eq!(bucket.available_at(Instant::now()), 2.0);
    }
}
