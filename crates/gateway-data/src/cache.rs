//! TTL + LRU 캐시.
//!
//! 값은 JSON으로 직렬화해 보관하므로 한 인스턴스에 여러 타입을 저장할 수 있습니다.
//! 키는 `작업:심볼:파라미터` 형식을 사용합니다 (예: `price:BTC/USDT`).
//!
//! - 만료: 저장 후 `ttl`을 초과한 엔트리는 기본 조회에서 제거되고 미스로 집계됩니다.
//! - stale 조회: `allow_stale = true`면 만료된 값도 반환하며 제거하지 않습니다.
//! - LRU: 조회/저장 시마다 최근 사용 위치로 이동하며, 용량 초과 시
//!   가장 오래 접근되지 않은 엔트리를 제거합니다.
//!
//! 맵, LRU 순서, 히트/미스 카운터는 하나의 뮤텍스로 보호됩니다.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use gateway_core::CacheConfig;

use crate::error::{DataError, Result};

/// 캐시 엔트리.
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
    /// LRU 순서 키
    tick: u64,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// 접근 tick → 키. 첫 항목이 가장 오래 접근되지 않은 엔트리
    lru: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// 엔트리를 최근 사용 위치로 이동.
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.lru.remove(&entry.tick);
            entry.tick = tick;
            self.lru.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.lru.remove(&entry.tick);
                true
            }
            None => false,
        }
    }

    fn evict_lru(&mut self) -> Option<String> {
        let (_, key) = self.lru.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// 캐시 히트 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub value: T,
    /// TTL이 지난 값인지 여부
    pub stale: bool,
    /// 저장 후 경과 시간
    pub age: Duration,
}

/// 캐시 통계.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 접근이 없으면 0
    #[serde(serialize_with = "round_rate")]
    pub hit_rate: f64,
}

fn round_rate<S: Serializer>(rate: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64((rate * 10_000.0).round() / 10_000.0)
}

/// TTL + LRU 캐시 매니저.
pub struct CacheManager {
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl CacheManager {
    /// 최대 엔트리 수를 지정해 생성합니다.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries)
    }

    /// 값을 조회합니다.
    ///
    /// TTL이 지난 엔트리는 `allow_stale`이 false면 제거 후 `None`,
    /// true면 제거하지 않고 반환합니다.
    pub fn get<T: DeserializeOwned>(&self, key: &str, allow_stale: bool) -> Result<Option<T>> {
        Ok(self.get_entry(key, allow_stale)?.map(|hit| hit.value))
    }

    /// 값과 stale 여부를 함께 조회합니다.
    pub fn get_entry<T: DeserializeOwned>(
        &self,
        key: &str,
        allow_stale: bool,
    ) -> Result<Option<CacheHit<T>>> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let Some(entry) = state.entries.get(key) else {
            state.misses += 1;
            metrics::counter!("gateway_cache_misses_total").increment(1);
            return Ok(None);
        };

        let stale = entry.is_expired(now);
        let age = entry.age(now);

        if stale && !allow_stale {
            state.remove(key);
            state.misses += 1;
            metrics::counter!("gateway_cache_misses_total").increment(1);
            return Ok(None);
        }

        match serde_json::from_value::<T>(entry.value.clone()) {
            Ok(value) => {
                if stale {
                    debug!(key = %key, age_ms = age.as_millis() as u64, "Serving stale cache entry");
                }
                state.touch(key);
                state.hits += 1;
                metrics::counter!("gateway_cache_hits_total").increment(1);
                Ok(Some(CacheHit { value, stale, age }))
            }
            Err(e) => {
                // 다른 타입으로 저장된 엔트리
                state.remove(key);
                state.misses += 1;
                Err(DataError::Serialization {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// 값을 저장합니다. 새 키이고 용량이 가득 찼으면 LRU 엔트리를 먼저 제거합니다.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| DataError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let mut state = self.state.lock();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_entries {
            if let Some(evicted) = state.evict_lru() {
                metrics::counter!("gateway_cache_evictions_total").increment(1);
                debug!(key = %evicted, "Evicted least recently used cache entry");
            }
        }

        state.remove(key);
        let tick = state.next_tick();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
                tick,
            },
        );
        state.lru.insert(tick, key.to_string());
        Ok(())
    }

    /// 키를 즉시 제거합니다.
    pub fn invalidate(&self, key: &str) -> bool {
        self.state.lock().remove(key)
    }

    /// 부분 문자열이 포함된 키를 모두 제거합니다.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .keys()
            .filter(|k| k.contains(pattern))
            .cloned()
            .collect();
        for key in &keys {
            state.remove(key);
        }
        keys.len()
    }

    /// 모든 엔트리를 제거합니다. 히트/미스 카운터는 유지됩니다.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.lru.clear();
        count
    }

    /// 만료된 엔트리를 제거하고 제거된 개수를 반환합니다.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "Cache cleanup");
        }
        expired.len()
    }

    /// 통계 조회.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let total = state.hits + state.misses;
        CacheStats {
            entries: state.entries.len(),
            max_entries: self.max_entries,
            hits: state.hits,
            misses: state.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                state.hits as f64 / total as f64
            },
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
