//! 거래소별 Circuit Breaker.
//!
//! 연속 실패가 임계치에 도달하면 해당 거래소로의 요청을 즉시 거부합니다.
//!
//! # 상태 전이
//!
//! ```text
//! Closed ──[연속 실패 임계치 도달]──> Open
//!    ↑                                 │
//!    └────────[쿨다운 경과]────────────┘
//! ```
//!
//! Open에서 Closed로의 복귀는 시간만으로 결정됩니다 (HalfOpen 없음).
//! 쿨다운 경과 여부는 상태를 조회할 때마다 지연 평가되므로 별도 타이머가 필요 없습니다.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use gateway_core::{GatewayError, RateLimitConfig};
use serde::Serialize;

/// Circuit Breaker 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    /// 정상 상태 - 모든 요청 허용
    Closed,
    /// 장애 상태 - 모든 요청 즉시 거부
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

/// Circuit Breaker 설정.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Open 전이 연속 실패 횟수
    pub failure_threshold: u32,
    /// Open 유지 시간
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            cooldown: Duration::from_secs(300),
        }
    }
}

impl From<&RateLimitConfig> for CircuitBreakerConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
        }
    }
}

/// Circuit Breaker 내부 상태.
struct CircuitBreakerState {
    state: CircuitState,
    failure_count: u32,
    last_state_change: Instant,
}

/// Circuit Breaker.
pub struct CircuitBreaker {
    /// 거래소 이름 (로깅 및 메트릭용)
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitBreakerState>,
    /// 총 실패 횟수 (메트릭용)
    total_failures: AtomicU64,
    /// 총 성공 횟수 (메트릭용)
    total_successes: AtomicU64,
    /// Circuit Open 횟수 (메트릭용)
    open_count: AtomicU64,
}

impl CircuitBreaker {
    /// 새 Circuit Breaker 생성.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_state_change: Instant::now(),
            }),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            open_count: AtomicU64::new(0),
        }
    }

    /// 기본 설정으로 생성.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 현재 상태 반환.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.maybe_close_after_cooldown(&mut state);
        state.state
    }

    /// 현재 연속 실패 횟수.
    pub fn failure_count(&self) -> u32 {
        let mut state = self.state.lock();
        self.maybe_close_after_cooldown(&mut state);
        state.failure_count
    }

    /// 요청 허용 여부 확인. 열려 있으면 남은 대기 시간과 함께 거부합니다.
    pub fn check(&self) -> Result<(), CircuitOpenError> {
        let mut state = self.state.lock();
        self.maybe_close_after_cooldown(&mut state);

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(CircuitOpenError {
                name: self.name.clone(),
                retry_after: self
                    .config
                    .cooldown
                    .saturating_sub(state.last_state_change.elapsed()),
            }),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.check().is_ok()
    }

    /// 성공 기록. 연속 실패 카운터를 리셋합니다.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        self.maybe_close_after_cooldown(&mut state);
        if state.state == CircuitState::Closed {
            state.failure_count = 0;
        }
    }

    /// 실패 기록.
    ///
    /// 이 호출로 Circuit이 열렸으면 `true`를 반환합니다.
    pub fn record_failure(&self) -> bool {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        self.maybe_close_after_cooldown(&mut state);

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    // Closed → Open
                    self.transition_to(&mut state, CircuitState::Open);
                    self.open_count.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("gateway_circuit_breaker_opened_total", "exchange" => self.name.clone())
                        .increment(1);
                    tracing::warn!(
                        circuit_breaker = %self.name,
                        failure_count = state.failure_count,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        "Circuit breaker tripped: Closed -> Open"
                    );
                    return true;
                }
                false
            }
            // 이미 Open 상태
            CircuitState::Open => false,
        }
    }

    /// 수동으로 Circuit 리셋.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        self.transition_to(&mut state, CircuitState::Closed);
        tracing::info!(
            circuit_breaker = %self.name,
            "Circuit breaker manually reset"
        );
    }

    /// 메트릭 반환.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut state = self.state.lock();
        self.maybe_close_after_cooldown(&mut state);
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            failure_count: state.failure_count,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            open_count: self.open_count.load(Ordering::Relaxed),
            time_in_current_state: state.last_state_change.elapsed(),
        }
    }

    /// Open 상태에서 쿨다운이 경과했으면 Closed로 전이.
    fn maybe_close_after_cooldown(&self, state: &mut CircuitBreakerState) {
        if state.state == CircuitState::Open
            && state.last_state_change.elapsed() >= self.config.cooldown
        {
            self.transition_to(state, CircuitState::Closed);
            tracing::info!(
                circuit_breaker = %self.name,
                "Circuit breaker cooldown elapsed: Open -> Closed"
            );
        }
    }

    /// 상태 전이.
    fn transition_to(&self, state: &mut CircuitBreakerState, new_state: CircuitState) {
        state.state = new_state;
        state.last_state_change = Instant::now();

        if new_state == CircuitState::Closed {
            state.failure_count = 0;
        }
    }
}

/// Circuit Breaker 메트릭.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    /// 현재 연속 실패 횟수
    pub failure_count: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub open_count: u64,
    /// 현재 상태 유지 시간
    pub time_in_current_state: Duration,
}

/// Circuit이 열려있을 때 반환되는 에러.
#[derive(Debug, Clone)]
pub struct CircuitOpenError {
    /// 거래소 이름
    pub name: String,
    /// 남은 대기 시간
    pub retry_after: Duration,
}

impl std::fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Circuit breaker '{}' is open (retry after {:?})",
            self.name, self.retry_after
        )
    }
}

impl std::error::Error for CircuitOpenError {}

impl From<CircuitOpenError> for GatewayError {
    fn from(err: CircuitOpenError) -> Self {
        GatewayError::CircuitOpen {
            exchange: err.name,
            retry_after: err.retry_after,
        }
    }
}
