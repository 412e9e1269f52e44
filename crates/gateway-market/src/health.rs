//! 거래소 헬스 상태 머신.
//!
//! # 상태 전이
//!
//! ```text
//!              ┌───────────[성공]────────────┐
//!              ↓                              │
//! Healthy ──[일반 실패 N회 연속]──> Unhealthy(Generic)   (리셋 또는 성공으로만 복구)
//!    │  ↑
//!    │  └──[복구 시간 경과, tick_health]──┐
//!    └──[지역 차단 3회]──> Unhealthy(GeoRestricted)
//! ```
//!
//! 지역 차단은 예상 가능한 상태이므로 debug 레벨로만 기록하고 시간이 지나면 자동 복구됩니다.
//! 일반 실패는 임계치를 넘는 순간 한 번만 warn으로 기록합니다.
//!
//! `is_healthy`는 상태를 바꾸지 않습니다. 복구 시간이 지난 지역 차단 거래소는
//! 조회 시 이미 정상으로 보고되고, 실제 상태 전이는 `tick_health`가 수행합니다.
//! `record_success`/`record_failure`도 기록 전에 같은 전이를 먼저 적용합니다.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use gateway_core::{GatewayError, GatewayResult, HealthConfig};
use gateway_exchange::ExchangeError;

/// 비정상 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhealthyReason {
    Generic,
    GeoRestricted,
}

/// 거래소 헬스 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy(UnhealthyReason),
}

/// 헬스 임계치.
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    /// 일반 실패 연속 횟수 임계치
    pub unhealthy_threshold: u32,
    /// 지역 차단 연속 횟수 임계치 (카운터 상한)
    pub geo_threshold: u32,
    /// 지역 차단 자동 복구 시간
    pub geo_recovery: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 5,
            geo_threshold: 3,
            geo_recovery: Duration::from_secs(300),
        }
    }
}

impl From<&HealthConfig> for HealthPolicy {
    fn from(config: &HealthConfig) -> Self {
        Self {
            unhealthy_threshold: config.unhealthy_threshold.max(1),
            geo_threshold: config.geo_threshold.max(1),
            geo_recovery: config.geo_recovery(),
        }
    }
}

#[derive(Debug)]
struct ExchangeHealth {
    state: HealthState,
    latency_ms: Option<u64>,
    consecutive_failures: u32,
    last_error: Option<String>,
    last_error_at: Option<Instant>,
    last_success: Option<DateTime<Utc>>,
}

impl ExchangeHealth {
    fn new() -> Self {
        Self {
            state: HealthState::Healthy,
            latency_ms: None,
            consecutive_failures: 0,
            last_error: None,
            last_error_at: None,
            last_success: None,
        }
    }

    fn geo_window_elapsed(&self, recovery: Duration, now: Instant) -> bool {
        self.last_error_at
            .map(|at| now.saturating_duration_since(at) >= recovery)
            .unwrap_or(true)
    }

    /// 복구 시간이 지난 지역 차단 상태를 Healthy로 전이합니다. 전이했으면 `true`.
    fn recover_geo(&mut self, name: &str, recovery: Duration, now: Instant) -> bool {
        if self.state != HealthState::Unhealthy(UnhealthyReason::GeoRestricted)
            || !self.geo_window_elapsed(recovery, now)
        {
            return false;
        }
        self.state = HealthState::Healthy;
        self.consecutive_failures = 0;
        info!(exchange = %name, "Geo restriction window elapsed, exchange re-enabled");
        true
    }
}

/// API 응답용 헬스 스냅샷.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnhealthyReason>,
    pub geo_restricted: bool,
    pub consecutive_failures: u32,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    /// 지역 차단 자동 복구까지 남은 시간 (초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovers_in_secs: Option<u64>,
}

/// 거래소별 헬스 추적기.
///
/// 거래소 목록은 생성 시 고정되며 순서(우선순위)를 유지합니다.
pub struct HealthTracker {
    policy: HealthPolicy,
    order: Vec<String>,
    records: Mutex<HashMap<String, ExchangeHealth>>,
}

impl HealthTracker {
    pub fn new<I, S>(exchanges: I, policy: HealthPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = exchanges.into_iter().map(Into::into).collect();
        let records = order
            .iter()
            .map(|name| (name.clone(), ExchangeHealth::new()))
            .collect();
        Self {
            policy,
            order,
            records: Mutex::new(records),
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// 성공 기록. 어떤 상태에서든 Healthy로 전이합니다.
    pub fn record_success(&self, name: &str, latency: Duration) {
        let now = Instant::now();
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(name) else {
            return;
        };

        record.recover_geo(name, self.policy.geo_recovery, now);
        if let HealthState::Unhealthy(reason) = record.state {
            info!(exchange = %name, ?reason, "Exchange recovered after successful call");
        }
        record.state = HealthState::Healthy;
        record.consecutive_failures = 0;
        record.latency_ms = Some(latency.as_millis() as u64);
        record.last_success = Some(Utc::now());
    }

    /// 실패 기록.
    pub fn record_failure(&self, name: &str, error: &ExchangeError) {
        let now = Instant::now();
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(name) else {
            return;
        };

        // 이미 복구된 것으로 보이는 기록에 실패가 누적되지 않도록 먼저 전이
        record.recover_geo(name, self.policy.geo_recovery, now);

        record.last_error = Some(error.to_string());
        record.last_error_at = Some(now);

        if error.is_geo_restricted() {
            record.consecutive_failures =
                (record.consecutive_failures + 1).min(self.policy.geo_threshold);
            if record.consecutive_failures >= self.policy.geo_threshold
                && record.state != HealthState::Unhealthy(UnhealthyReason::GeoRestricted)
            {
                record.state = HealthState::Unhealthy(UnhealthyReason::GeoRestricted);
                debug!(
                    exchange = %name,
                    recovery_secs = self.policy.geo_recovery.as_secs(),
                    "Exchange geo-restricted, pausing until recovery window elapses"
                );
            }
            return;
        }

        record.consecutive_failures += 1;
        if record.state == HealthState::Healthy
            && record.consecutive_failures >= self.policy.unhealthy_threshold
        {
            record.state = HealthState::Unhealthy(UnhealthyReason::Generic);
            warn!(
                exchange = %name,
                failures = record.consecutive_failures,
                error = %error,
                "Exchange marked unhealthy"
            );
        }
    }

    /// 라우팅 가능 여부. 상태를 바꾸지 않습니다.
    pub fn is_healthy(&self, name: &str) -> bool {
        let now = Instant::now();
        let records = self.records.lock();
        match records.get(name) {
            None => false,
            Some(record) => match record.state {
                HealthState::Healthy => true,
                HealthState::Unhealthy(UnhealthyReason::Generic) => false,
                HealthState::Unhealthy(UnhealthyReason::GeoRestricted) => {
                    record.geo_window_elapsed(self.policy.geo_recovery, now)
                }
            },
        }
    }

    /// 현재 상태 (저장된 값 그대로).
    pub fn state(&self, name: &str) -> Option<HealthState> {
        self.records.lock().get(name).map(|r| r.state)
    }

    /// 복구 시간이 지난 지역 차단 거래소를 Healthy로 되돌리고 이름을 반환합니다.
    pub fn tick_health(&self) -> Vec<String> {
        let now = Instant::now();
        let mut records = self.records.lock();
        let mut recovered = Vec::new();

        for name in &self.order {
            let Some(record) = records.get_mut(name) else {
                continue;
            };
            if record.recover_geo(name, self.policy.geo_recovery, now) {
                recovered.push(name.clone());
            }
        }

        recovered
    }

    /// 수동 리셋.
    pub fn reset(&self, name: &str) -> GatewayResult<()> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(name)
            .ok_or_else(|| GatewayError::UnknownExchange(name.to_string()))?;
        record.state = HealthState::Healthy;
        record.consecutive_failures = 0;
        record.last_error = None;
        record.last_error_at = None;
        info!(exchange = %name, "Exchange health manually reset");
        Ok(())
    }

    /// 라우팅 가능한 거래소 (우선순위 순).
    pub fn healthy_exchanges(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.is_healthy(name))
            .cloned()
            .collect()
    }

    /// 거래소별 스냅샷 (우선순위 순).
    pub fn snapshot(&self) -> Vec<HealthSnapshot> {
        let now = Instant::now();
        let records = self.records.lock();

        self.order
            .iter()
            .filter_map(|name| {
                let record = records.get(name)?;
                let geo = record.state == HealthState::Unhealthy(UnhealthyReason::GeoRestricted);
                let recovered = geo && record.geo_window_elapsed(self.policy.geo_recovery, now);
                let healthy = record.state == HealthState::Healthy || recovered;
                let recovers_in_secs = match (geo && !recovered, record.last_error_at) {
                    (true, Some(at)) => Some(
                        self.policy
                            .geo_recovery
                            .saturating_sub(now.saturating_duration_since(at))
                            .as_secs(),
                    ),
                    _ => None,
                };

                Some(HealthSnapshot {
                    name: name.clone(),
                    healthy,
                    reason: match record.state {
                        HealthState::Unhealthy(reason) if !healthy => Some(reason),
                        _ => None,
                    },
                    geo_restricted: geo && !recovered,
                    consecutive_failures: record.consecutive_failures,
                    latency_ms: record.latency_ms,
                    last_error: record.last_error.clone(),
                    last_success: record.last_success,
                    recovers_in_secs,
                })
            })
            .collect()
    }
}
