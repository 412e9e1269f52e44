//! 다중 거래소 집계기.
//!
//! 모든 업스트림 호출은 다음 순서를 거칩니다:
//!
//! 1. 헬스 확인 (비정상 거래소는 건너뜀)
//! 2. Rate limiter 토큰 획득 (circuit breaker 포함)
//! 3. 요청 타임아웃을 걸고 호출
//! 4. 결과를 헬스 추적기와 rate limiter 양쪽에 기록
//!
//! 가격은 정상 거래소 전체에 동시에 요청해 중앙값을 쓰고,
//! 캔들은 우선순위 순서대로 하나씩 시도해 처음 성공한 결과를 씁니다.

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};

use gateway_core::{
    market_span, normalize_symbol, GatewayConfig, GatewayError, GatewayResult, MarketFrames,
    Ohlcv, PriceData, RequestPriority, SourceError, SourcePrice, Timeframe, MIN_PRICE_SOURCES,
};
use gateway_data::CacheManager;
use gateway_exchange::{CandleSource, ExchangeError, ExchangeResult, RateLimitStats, RateLimiter};

use crate::health::{HealthPolicy, HealthSnapshot, HealthTracker};
use crate::pricing;

/// 집계기 동작 설정.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub price_ttl: Duration,
    pub ohlcv_ttl: Duration,
    pub request_timeout: Duration,
    /// 가격 집계에 필요한 최소 응답 거래소 수
    pub min_sources: usize,
    /// 최신 가격 조회에 쓰는 캔들 타임프레임
    pub price_timeframe: Timeframe,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            price_ttl: Duration::from_secs(10),
            ohlcv_ttl: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            min_sources: 2,
            price_timeframe: Timeframe::M1,
        }
    }
}

impl AggregatorSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            price_ttl: config.cache.price_ttl(),
            ohlcv_ttl: config.cache.ohlcv_ttl(),
            request_timeout: config.aggregator.request_timeout(),
            min_sources: config.aggregator.min_sources.max(MIN_PRICE_SOURCES),
            price_timeframe: config.aggregator.price_timeframe,
        }
    }
}

/// 집계 대상 거래소 하나.
#[derive(Clone)]
pub struct ExchangeEntry {
    pub source: Arc<dyn CandleSource>,
    pub requests_per_minute: u32,
}

impl ExchangeEntry {
    pub fn new(source: Arc<dyn CandleSource>, requests_per_minute: u32) -> Self {
        Self {
            source,
            requests_per_minute,
        }
    }
}

/// 거래소 상태 (헬스 + rate limit).
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeStatus {
    #[serde(flatten)]
    pub health: HealthSnapshot,
    pub rate_limit: Option<RateLimitStats>,
}

/// 다중 거래소 집계기.
pub struct ExchangeAggregator {
    /// 우선순위 순 거래소 목록
    entries: Vec<ExchangeEntry>,
    limiter: RateLimiter,
    cache: Arc<CacheManager>,
    health: HealthTracker,
    settings: AggregatorSettings,
    initialized: AtomicBool,
}

impl ExchangeAggregator {
    pub fn new(
        entries: Vec<ExchangeEntry>,
        limiter: RateLimiter,
        cache: Arc<CacheManager>,
        health_policy: HealthPolicy,
        settings: AggregatorSettings,
    ) -> Self {
        let health = HealthTracker::new(
            entries.iter().map(|e| e.source.name().to_string()),
            health_policy,
        );
        Self {
            entries,
            limiter,
            cache,
            health,
            settings,
            initialized: AtomicBool::new(false),
        }
    }

    /// 거래소별 rate limiter 버킷을 등록합니다. 여러 번 호출해도 한 번만 적용됩니다.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in &self.entries {
            self.limiter
                .init_exchange(entry.source.name(), entry.requests_per_minute);
        }
        info!(
            exchanges = ?self.exchange_names(),
            min_sources = self.settings.min_sources,
            "Exchange aggregator initialized"
        );
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// 설정된 거래소 이름 (우선순위 순).
    pub fn exchange_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.source.name().to_string())
            .collect()
    }

    /// 집계 가격 조회.
    ///
    /// 캐시에 신선한 값이 있으면 업스트림을 호출하지 않습니다.
    /// 응답한 거래소가 `min_sources`보다 적으면 `InsufficientSources`를 반환합니다.
    pub async fn get_aggregated_price(&self, symbol: &str) -> GatewayResult<PriceData> {
        let symbol = normalize_symbol(symbol);
        let span = market_span!("aggregated_price", symbol);
        self.aggregate_price(&symbol).instrument(span).await
    }

    async fn aggregate_price(&self, symbol: &str) -> GatewayResult<PriceData> {
        let key = format!("price:{}", symbol);
        if let Some(cached) = self.cached::<PriceData>(&key) {
            debug!("Price served from cache");
            return Ok(cached);
        }

        let mut errors = Vec::new();
        let mut targets = Vec::new();
        for entry in &self.entries {
            let name = entry.source.name();
            if self.health.is_healthy(name) {
                targets.push(Arc::clone(&entry.source));
            } else {
                errors.push(SourceError::new(name, "skipped: exchange unhealthy"));
            }
        }

        let timeframe = self.settings.price_timeframe;
        let calls = targets.into_iter().map(|source| async move {
            let name = source.name().to_string();
            let fetch = async {
                let price = source.fetch_latest_price(symbol, timeframe).await?;
                if price <= Decimal::ZERO {
                    return Err(ExchangeError::Malformed(format!(
                        "non-positive price {}",
                        price
                    )));
                }
                Ok(price)
            };
            self.call_source(&name, RequestPriority::High, fetch).await
        });

        let mut observations = Vec::new();
        for result in join_all(calls).await {
            match result {
                Ok((exchange, price, latency)) => observations.push(SourcePrice {
                    exchange,
                    price,
                    latency_ms: latency.as_millis() as u64,
                }),
                Err(e) => errors.push(e),
            }
        }

        if observations.len() < self.settings.min_sources {
            metrics::counter!("gateway_price_aggregations_total", "outcome" => "insufficient")
                .increment(1);
            warn!(
                found = observations.len(),
                required = self.settings.min_sources,
                errors = errors.len(),
                "Not enough exchanges responded"
            );
            return Err(GatewayError::InsufficientSources {
                symbol: symbol.to_string(),
                found: observations.len(),
                errors,
            });
        }

        let prices: Vec<Decimal> = observations.iter().map(|o| o.price).collect();
        let price = pricing::median(&prices).unwrap_or(Decimal::ZERO);
        let deviation = pricing::max_deviation(&prices, price);
        let confidence = pricing::confidence(deviation, observations.len(), self.entries.len());

        let data = PriceData {
            symbol: symbol.to_string(),
            price,
            confidence,
            sources: observations.iter().map(|o| o.exchange.clone()).collect(),
            deviation,
            observations,
            errors,
            timestamp: Utc::now(),
        };

        metrics::counter!("gateway_price_aggregations_total", "outcome" => "success").increment(1);
        debug!(
            price = %data.price,
            deviation = %data.deviation,
            confidence = data.confidence,
            sources = data.sources.len(),
            "Price aggregated"
        );

        self.store(&key, &data, self.settings.price_ttl);
        Ok(data)
    }

    /// 캔들 조회 (보통 우선순위).
    pub async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> GatewayResult<Vec<Ohlcv>> {
        self.get_ohlcv_with_priority(symbol, timeframe, limit, RequestPriority::Normal)
            .await
    }

    /// 캔들 조회.
    ///
    /// 정상 거래소를 우선순위 순으로 시도하고 처음 성공한 결과를 반환합니다.
    /// 결과는 하나의 거래소에서만 옵니다.
    pub async fn get_ohlcv_with_priority(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        priority: RequestPriority,
    ) -> GatewayResult<Vec<Ohlcv>> {
        let symbol = normalize_symbol(symbol);
        let span = market_span!("ohlcv", symbol, timeframe);
        self.fetch_ohlcv(&symbol, timeframe, limit, priority)
            .instrument(span)
            .await
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        priority: RequestPriority,
    ) -> GatewayResult<Vec<Ohlcv>> {
        let key = format!("ohlcv:{}:{}:{}", symbol, timeframe, limit);
        if let Some(cached) = self.cached::<Vec<Ohlcv>>(&key) {
            debug!("Candles served from cache");
            return Ok(cached);
        }

        let mut errors = Vec::new();
        for entry in &self.entries {
            let name = entry.source.name();
            if !self.health.is_healthy(name) {
                errors.push(SourceError::new(name, "skipped: exchange unhealthy"));
                continue;
            }

            let fetch = entry.source.fetch_candles(symbol, timeframe, limit);
            match self.call_source(name, priority, fetch).await {
                Ok((_, candles, _)) if candles.is_empty() => {
                    debug!(exchange = %name, "Exchange returned no candles, trying next");
                    errors.push(SourceError::new(name, "no candles returned"));
                }
                Ok((_, candles, _)) => {
                    debug!(exchange = %name, count = candles.len(), "Candles fetched");
                    self.store(&key, &candles, self.settings.ohlcv_ttl);
                    return Ok(candles);
                }
                Err(e) => errors.push(e),
            }
        }

        warn!(errors = errors.len(), "All exchanges failed to provide candles");
        Err(GatewayError::AllSourcesFailed {
            symbol: symbol.to_string(),
            errors,
        })
    }

    /// 여러 타임프레임 캔들을 동시에 조회합니다.
    ///
    /// 일부 타임프레임이 실패해도 나머지는 반환하며, 모두 실패한 경우에만 에러입니다.
    pub async fn get_market_frames(
        &self,
        symbol: &str,
        timeframes: &[Timeframe],
        limit: usize,
    ) -> GatewayResult<MarketFrames> {
        let symbol = normalize_symbol(symbol);
        let results = join_all(timeframes.iter().map(|tf| {
            let symbol = symbol.as_str();
            async move { (*tf, self.get_ohlcv(symbol, *tf, limit).await) }
        }))
        .await;

        let mut frames = BTreeMap::new();
        let mut failures = BTreeMap::new();
        let mut errors = Vec::new();
        for (timeframe, result) in results {
            match result {
                Ok(candles) => {
                    frames.insert(timeframe, candles);
                }
                Err(e) => {
                    failures.insert(timeframe, e.to_string());
                    errors.extend(e.source_errors().iter().cloned());
                }
            }
        }

        if frames.is_empty() && !failures.is_empty() {
            return Err(GatewayError::AllSourcesFailed { symbol, errors });
        }

        Ok(MarketFrames {
            symbol,
            frames,
            failures,
        })
    }

    /// 거래소별 헬스와 rate limit 상태.
    pub fn get_health_status(&self) -> Vec<ExchangeStatus> {
        self.health
            .snapshot()
            .into_iter()
            .map(|health| {
                let rate_limit = self.limiter.stats(&health.name).ok();
                ExchangeStatus { health, rate_limit }
            })
            .collect()
    }

    /// 거래소 헬스와 circuit breaker를 함께 리셋합니다.
    pub fn reset_exchange_health(&self, name: &str) -> GatewayResult<()> {
        self.health.reset(name)?;
        if let Err(e) = self.limiter.reset_exchange(name) {
            debug!(exchange = %name, error = %e, "Rate limiter has no state for exchange");
        }
        Ok(())
    }

    /// 복구 시간이 지난 지역 차단 거래소를 재활성화합니다.
    pub fn tick_health(&self) -> Vec<String> {
        self.health.tick_health()
    }

    /// 토큰 획득 → 타임아웃 호출 → 결과 기록.
    ///
    /// Circuit breaker 거부는 업스트림이 호출되지 않았으므로 헬스에 반영하지 않습니다.
    async fn call_source<T, F>(
        &self,
        name: &str,
        priority: RequestPriority,
        fetch: F,
    ) -> Result<(String, T, Duration), SourceError>
    where
        F: Future<Output = ExchangeResult<T>>,
    {
        if let Err(e) = self.limiter.acquire(name, priority).await {
            debug!(exchange = %name, error = %e, "Upstream call not admitted");
            metrics::counter!(
                "gateway_upstream_requests_total",
                "exchange" => name.to_string(),
                "outcome" => "rejected"
            )
            .increment(1);
            return Err(SourceError::new(name, e.to_string()));
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(self.settings.request_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout),
        };
        let latency = started.elapsed();

        match result {
            Ok(value) => {
                self.health.record_success(name, latency);
                self.limiter.record_success(name);
                metrics::counter!(
                    "gateway_upstream_requests_total",
                    "exchange" => name.to_string(),
                    "outcome" => "success"
                )
                .increment(1);
                metrics::histogram!(
                    "gateway_upstream_latency_seconds",
                    "exchange" => name.to_string()
                )
                .record(latency.as_secs_f64());
                Ok((name.to_string(), value, latency))
            }
            Err(e) => {
                self.health.record_failure(name, &e);
                self.limiter.record_failure(name);
                metrics::counter!(
                    "gateway_upstream_requests_total",
                    "exchange" => name.to_string(),
                    "outcome" => e.kind()
                )
                .increment(1);
                debug!(exchange = %name, error = %e, "Upstream call failed");
                Err(SourceError::new(name, e.to_string()))
            }
        }
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get::<T>(key, false) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                None
            }
        }
    }

    fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        if let Err(e) = self.cache.set(key, value, ttl) {
            warn!(key = %key, error = %e, "Failed to cache value");
        }
    }
}
