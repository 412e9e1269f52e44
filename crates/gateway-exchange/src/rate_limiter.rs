//! 거래소별 우선순위 Rate Limiter.
//!
//! 각 거래소는 Token Bucket, 우선순위 대기열, Circuit Breaker를 하나씩 가집니다.
//!
//! - `acquire()`는 대기열에 요청을 넣고 토큰이 배정될 때까지 대기합니다.
//! - 거래소마다 하나의 drain 태스크만 버킷을 변경하며, 한 번에 하나씩
//!   `High > Normal > Low`, 같은 우선순위 안에서는 FIFO 순서로 토큰을 배정합니다.
//! - drain 태스크는 고정 주기로 폴링하지 않고, 다음 토큰이 리필되는 시점까지
//!   잠들거나 새 요청/상태 변경 알림을 받을 때 깨어납니다.
//! - Circuit이 열려 있으면 `acquire()`는 대기열에 들어가지 않고 즉시 거부되며,
//!   이미 대기 중이던 요청도 모두 거부됩니다.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gateway_core::{GatewayError, GatewayResult, RequestPriority};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::token_bucket::TokenBucket;

type Grant = GatewayResult<()>;

/// 대기 중인 요청.
struct QueuedRequest {
    id: Uuid,
    priority: RequestPriority,
    /// 같은 우선순위 안에서 FIFO 순서를 보장하는 일련번호
    seq: u64,
    enqueued_at: Instant,
    tx: oneshot::Sender<Grant>,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    // BinaryHeap은 최대 힙: 높은 우선순위, 낮은 seq가 먼저
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct RequestQueue {
    heap: BinaryHeap<QueuedRequest>,
    next_seq: u64,
}

impl RequestQueue {
    fn push(&mut self, id: Uuid, priority: RequestPriority, tx: oneshot::Sender<Grant>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedRequest {
            id,
            priority,
            seq,
            enqueued_at: Instant::now(),
            tx,
        });
    }

    /// 호출자가 사라진 요청은 세지 않습니다.
    fn live_len(&self) -> usize {
        self.heap.iter().filter(|r| !r.tx.is_closed()).count()
    }
}

/// drain 한 번의 결과.
enum DrainOutcome {
    /// 대기열이 비었음
    Idle,
    /// 다음 토큰까지 대기
    WaitFor(Duration),
}

/// 거래소 하나의 admission 상태.
struct ExchangeLimiter {
    name: String,
    bucket: Mutex<TokenBucket>,
    queue: Mutex<RequestQueue>,
    breaker: CircuitBreaker,
    notify: Notify,
    drainer_started: AtomicBool,
    closed: AtomicBool,
}

impl ExchangeLimiter {
    fn new(name: &str, requests_per_minute: u32, breaker: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            bucket: Mutex::new(TokenBucket::per_minute(requests_per_minute)),
            queue: Mutex::new(RequestQueue::default()),
            breaker: CircuitBreaker::new(name, breaker),
            notify: Notify::new(),
            drainer_started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// 가능한 만큼 토큰을 배정합니다.
    fn drain_ready(&self) -> DrainOutcome {
        let mut queue = self.queue.lock();

        if self.closed.load(Ordering::Acquire) {
            for request in queue.heap.drain() {
                let _ = request.tx.send(Err(GatewayError::LimiterClosed));
            }
            return DrainOutcome::Idle;
        }

        if let Err(open) = self.breaker.check() {
            let rejected = queue.heap.len();
            for request in queue.heap.drain() {
                let _ = request.tx.send(Err(open.clone().into()));
            }
            if rejected > 0 {
                debug!(exchange = %self.name, rejected, "Rejected queued requests: circuit open");
            }
            return DrainOutcome::Idle;
        }

        loop {
            // 호출자가 사라진 요청은 토큰 없이 버림
            while queue.heap.peek().is_some_and(|r| r.tx.is_closed()) {
                if let Some(dropped) = queue.heap.pop() {
                    debug!(exchange = %self.name, request_id = %dropped.id, "Discarded cancelled request");
                }
            }

            if queue.heap.is_empty() {
                return DrainOutcome::Idle;
            }

            let mut bucket = self.bucket.lock();
            bucket.refill();
            if !bucket.try_take() {
                return DrainOutcome::WaitFor(bucket.time_until_next_token());
            }

            let Some(request) = queue.heap.pop() else {
                bucket.refund();
                return DrainOutcome::Idle;
            };

            let waited = request.enqueued_at.elapsed();
            if request.tx.send(Ok(())).is_err() {
                // 배정 직전에 취소됨
                bucket.refund();
                continue;
            }

            metrics::histogram!("gateway_rate_limit_wait_seconds", "exchange" => self.name.clone())
                .record(waited.as_secs_f64());
            if waited >= Duration::from_secs(1) {
                debug!(
                    exchange = %self.name,
                    request_id = %request.id,
                    priority = %request.priority,
                    waited_ms = waited.as_millis() as u64,
                    "Rate limit token granted after wait"
                );
            }
        }
    }
}

/// 단일 거래소 drain 루프.
async fn drain_loop(limiter: Arc<ExchangeLimiter>) {
    debug!(exchange = %limiter.name, "Rate limiter drainer started");

    loop {
        let outcome = limiter.drain_ready();
        if limiter.closed.load(Ordering::Acquire) {
            break;
        }

        match outcome {
            DrainOutcome::Idle => limiter.notify.notified().await,
            DrainOutcome::WaitFor(wait) => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = limiter.notify.notified() => {}
                }
            }
        }
    }

    debug!(exchange = %limiter.name, "Rate limiter drainer stopped");
}

/// 거래소별 Rate Limit 통계.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub exchange: String,
    /// 현재 사용 가능한 토큰
    pub available_tokens: f64,
    /// 버킷 용량
    pub capacity: f64,
    /// 사용률 (0.0 - 1.0)
    pub usage_fraction: f64,
    /// 대기 중인 요청 수
    pub queue_depth: usize,
    /// Circuit이 닫혀 있는지 여부
    pub healthy: bool,
    /// 연속 실패 횟수
    pub failures: u32,
    pub circuit_state: CircuitState,
    /// Circuit이 열려 있을 때 남은 시간 (초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

struct Inner {
    breaker_config: CircuitBreakerConfig,
    exchanges: RwLock<HashMap<String, Arc<ExchangeLimiter>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for limiter in self.exchanges.get_mut().values() {
            limiter.closed.store(true, Ordering::Release);
            limiter.notify.notify_one();
        }
    }
}

/// 우선순위 대기열을 가진 거래소별 Rate Limiter.
///
/// 복제해도 같은 상태를 공유합니다.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl RateLimiter {
    /// 새 Rate Limiter 생성.
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                breaker_config,
                exchanges: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// 거래소 버킷 초기화. 용량은 분당 요청 수, 가득 찬 상태로 시작합니다.
    ///
    /// 이미 초기화된 거래소는 그대로 둡니다.
    pub fn init_exchange(&self, name: &str, requests_per_minute: u32) {
        let mut exchanges = self.inner.exchanges.write();
        if exchanges.contains_key(name) {
            warn!(exchange = %name, "Rate limiter already initialized, keeping existing bucket");
            return;
        }

        exchanges.insert(
            name.to_string(),
            Arc::new(ExchangeLimiter::new(
                name,
                requests_per_minute,
                self.inner.breaker_config.clone(),
            )),
        );
        info!(exchange = %name, requests_per_minute, "Rate limiter initialized");
    }

    fn limiter(&self, name: &str) -> GatewayResult<Arc<ExchangeLimiter>> {
        self.inner
            .exchanges
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownExchange(name.to_string()))
    }

    /// 토큰을 얻을 때까지 대기합니다.
    ///
    /// Circuit이 열려 있으면 대기열에 들어가지 않고 즉시 `CircuitOpen`으로 실패합니다.
    pub async fn acquire(&self, exchange: &str, priority: RequestPriority) -> GatewayResult<()> {
        let limiter = self.limiter(exchange)?;

        if let Err(open) = limiter.breaker.check() {
            metrics::counter!("gateway_rate_limit_rejected_total", "exchange" => exchange.to_string())
                .increment(1);
            return Err(open.into());
        }

        let (tx, rx) = oneshot::channel();
        limiter.queue.lock().push(Uuid::new_v4(), priority, tx);

        if !limiter.drainer_started.swap(true, Ordering::AcqRel) {
            tokio::spawn(drain_loop(limiter.clone()));
        }
        limiter.notify.notify_one();

        rx.await.map_err(|_| GatewayError::LimiterClosed)?
    }

    /// 성공 기록. 연속 실패 카운터를 리셋합니다.
    pub fn record_success(&self, exchange: &str) {
        match self.limiter(exchange) {
            Ok(limiter) => limiter.breaker.record_success(),
            Err(_) => debug!(exchange = %exchange, "record_success for unknown exchange"),
        }
    }

    /// 실패 기록. 임계치에 도달하면 Circuit을 엽니다.
    pub fn record_failure(&self, exchange: &str) {
        match self.limiter(exchange) {
            Ok(limiter) => {
                if limiter.breaker.record_failure() {
                    // 대기 중인 요청 거부
                    limiter.notify.notify_one();
                }
            }
            Err(_) => debug!(exchange = %exchange, "record_failure for unknown exchange"),
        }
    }

    /// Circuit이 닫혀 있는지 확인합니다. 모르는 거래소는 `false`.
    pub fn is_healthy(&self, exchange: &str) -> bool {
        self.limiter(exchange)
            .map(|l| l.breaker.is_allowed())
            .unwrap_or(false)
    }

    /// Circuit 수동 리셋.
    pub fn reset_exchange(&self, exchange: &str) -> GatewayResult<()> {
        let limiter = self.limiter(exchange)?;
        limiter.breaker.reset();
        limiter.notify.notify_one();
        Ok(())
    }

    /// 거래소별 통계.
    pub fn stats(&self, exchange: &str) -> GatewayResult<RateLimitStats> {
        let limiter = self.limiter(exchange)?;

        let (available_tokens, capacity) = {
            let bucket = limiter.bucket.lock();
            (bucket.available_at(Instant::now()), bucket.capacity())
        };
        let queue_depth = limiter.queue.lock().live_len();
        let retry_after = limiter.breaker.check().err().map(|e| e.retry_after);
        let metrics = limiter.breaker.metrics();

        Ok(RateLimitStats {
            exchange: exchange.to_string(),
            available_tokens,
            capacity,
            usage_fraction: 1.0 - available_tokens / capacity,
            queue_depth,
            healthy: retry_after.is_none(),
            failures: metrics.failure_count,
            circuit_state: metrics.state,
            retry_after_secs: retry_after.map(|d| d.as_secs()),
        })
    }

    /// 모든 거래소 통계 (이름순).
    pub fn stats_all(&self) -> Vec<RateLimitStats> {
        let mut names = self.exchanges();
        names.sort();
        names.iter().filter_map(|n| self.stats(n).ok()).collect()
    }

    /// 초기화된 거래소 이름 목록.
    pub fn exchanges(&self) -> Vec<String> {
        self.inner.exchanges.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter_with(name: &str, rpm: u32) -> RateLimiter {
        let limiter = RateLimiter::default();
        limiter.init_exchange(name, rpm);
        limiter
    }

    async fn drain_all(limiter: &RateLimiter, name: &str, count: usize) {
        for _ in 0..count {
            limiter.acquire(name, RequestPriority::Normal).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_exchange() {
        let limiter = RateLimiter::default();
        let err = limiter
            .acquire("nope", RequestPriority::High)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownExchange(_)));
        assert!(limiter.stats("nope").is_err());
        assert!(!limiter.is_healthy("nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_starts_full() {
        let limiter = limiter_with("binance", 1200);
        let stats = limiter.stats("binance").unwrap();
        assert_eq!(stats.capacity, 1200.0);
        assert_eq!(stats.available_tokens, 1200.0);
        assert_eq!(stats.usage_fraction, 0.0);
        assert!(stats.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_fraction() {
        let limiter = limiter_with("x", 60);
        drain_all(&limiter, "x", 30).await;

        let stats = limiter.stats("x").unwrap();
        assert!((stats.usage_fraction - 0.5).abs() < 1e-6);
        assert_eq!(stats.queue_depth, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_waits_for_refill() {
        let limiter = limiter_with("x", 60);
        let start = Instant::now();

        // 용량 60 + 2건 초과 → 약 2초 대기
        drain_all(&limiter, "x", 62).await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1990), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2500), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_granted_first() {
        let limiter = limiter_with("x", 60);
        drain_all(&limiter, "x", 60).await;

        let order = Arc::new(Mutex::new(Vec::new()));

        let low = {
            let limiter = limiter.clone();
            let order = order.clone();
            tokio::spawn(async move {
                limiter.acquire("x", RequestPriority::Low).await.unwrap();
                order.lock().push("low");
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let high = {
            let limiter = limiter.clone();
            let order = order.clone();
            tokio::spawn(async move {
                limiter.acquire("x", RequestPriority::High).await.unwrap();
                order.lock().push("high");
            })
        };

        low.await.unwrap();
        high.await.unwrap();
        assert_eq!(*order.lock(), vec!["high", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_within_priority() {
        let limiter = limiter_with("x", 60);
        drain_all(&limiter, "x", 60).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire("x", RequestPriority::Normal).await.unwrap();
                order.lock().push(i);
            }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_ten_failures_and_recovers() {
        let limiter = limiter_with("x", 60);

        for _ in 0..9 {
            limiter.record_failure("x");
        }
        assert!(limiter.is_healthy("x"));
        limiter.record_failure("x");
        assert!(!limiter.is_healthy("x"));

        let err = limiter.acquire("x", RequestPriority::High).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(limiter.stats("x").unwrap().failures, 10);

        tokio::time::advance(Duration::from_secs(301)).await;

        limiter.acquire("x", RequestPriority::High).await.unwrap();
        let stats = limiter.stats("x").unwrap();
        assert_eq!(stats.failures, 0);
        assert!(stats.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let limiter = limiter_with("x", 60);
        for _ in 0..9 {
            limiter.record_failure("x");
        }
        limiter.record_success("x");
        limiter.record_failure("x");
        assert!(limiter.is_healthy("x"));
        assert_eq!(limiter.stats("x").unwrap().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_requests_rejected_when_circuit_opens() {
        let limiter = limiter_with("x", 60);
        drain_all(&limiter, "x", 60).await;

        let waiting = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire("x", RequestPriority::Normal).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(limiter.stats("x").unwrap().queue_depth, 1);

        for _ in 0..10 {
            limiter.record_failure("x");
        }

        let result = waiting.await.unwrap();
        assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_does_not_consume_token() {
        let limiter = limiter_with("x", 60);
        drain_all(&limiter, "x", 60).await;

        let timed_out = tokio::time::timeout(
            Duration::from_millis(100),
            limiter.acquire("x", RequestPriority::High),
        )
        .await;
        assert!(timed_out.is_err());

        // 다음 토큰은 취소된 요청이 아니라 이 요청에 배정됨
        let start = Instant::now();
        limiter.acquire("x", RequestPriority::Low).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_exchanges() {
        let limiter = RateLimiter::default();
        limiter.init_exchange("a", 60);
        limiter.init_exchange("b", 60);
        drain_all(&limiter, "a", 60).await;

        let start = Instant::now();
        limiter.acquire("b", RequestPriority::Low).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);

        let names: Vec<_> = limiter.stats_all().into_iter().map(|s| s.exchange).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_is_idempotent() {
        let limiter = limiter_with("x", 60);
        drain_all(&limiter, "x", 10).await;
        limiter.init_exchange("x", 600);

        let stats = limiter.stats("x").unwrap();
        assert_eq!(stats.capacity, 60.0);
        assert!((stats.available_tokens - 50.0).abs() < 1e-6);
    }
}
