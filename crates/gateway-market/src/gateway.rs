//! 게이트웨이 구성 루트.
//!
//! 설정에서 캐시, rate limiter, 캔들 소스, 집계기와 소비자를 한 번에 조립하고
//! 주기적인 유지보수 태스크(캐시 정리, 헬스 tick)를 실행합니다.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use gateway_core::{GatewayConfig, GatewayError, GatewayResult};
use gateway_data::CacheManager;
use gateway_exchange::{build_source, CandleSource, CircuitBreakerConfig, RateLimiter};

use crate::aggregator::{AggregatorSettings, ExchangeAggregator, ExchangeEntry};
use crate::health::HealthPolicy;
use crate::liquidity::LiquidityMonitor;
use crate::security::SecurityValidator;

/// 조립된 게이트웨이.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    cache: Arc<CacheManager>,
    limiter: RateLimiter,
    aggregator: Arc<ExchangeAggregator>,
    liquidity: LiquidityMonitor,
    security: SecurityValidator,
}

impl Gateway {
    /// 설정의 활성 거래소로 REST/시뮬레이션 소스를 생성해 조립합니다.
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        let timeout = config.aggregator.request_timeout();

        let entries = config
            .enabled_exchanges()
            .map(|exchange| {
                let source = build_source(exchange, timeout).map_err(|e| {
                    GatewayError::Config(format!(
                        "failed to build source for {}: {}",
                        exchange.name, e
                    ))
                })?;
                Ok(ExchangeEntry::new(source, exchange.requests_per_minute))
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self::assemble(config, entries))
    }

    /// 미리 만든 소스로 조립합니다.
    ///
    /// 분당 요청 수는 같은 이름의 설정 항목에서 가져오고, 없으면 기본값을 씁니다.
    pub fn with_sources(config: GatewayConfig, sources: Vec<Arc<dyn CandleSource>>) -> Self {
        let entries = sources
            .into_iter()
            .map(|source| {
                let rpm = config
                    .exchanges
                    .iter()
                    .find(|e| e.name == source.name())
                    .map(|e| e.requests_per_minute)
                    .unwrap_or(gateway_core::DEFAULT_REQUESTS_PER_MINUTE);
                ExchangeEntry::new(source, rpm)
            })
            .collect();

        Self::assemble(config, entries)
    }

    fn assemble(config: GatewayConfig, entries: Vec<ExchangeEntry>) -> Self {
        let cache = Arc::new(CacheManager::from_config(&config.cache));
        let limiter = RateLimiter::new(CircuitBreakerConfig::from(&config.rate_limit));
        let aggregator = Arc::new(ExchangeAggregator::new(
            entries,
            limiter.clone(),
            Arc::clone(&cache),
            HealthPolicy::from(&config.health),
            AggregatorSettings::from_config(&config),
        ));
        aggregator.initialize();

        Self {
            config: Arc::new(config),
            cache,
            limiter,
            liquidity: LiquidityMonitor::new(Arc::clone(&aggregator)),
            security: SecurityValidator::new(Arc::clone(&aggregator)),
            aggregator,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn aggregator(&self) -> &Arc<ExchangeAggregator> {
        &self.aggregator
    }

    pub fn liquidity(&self) -> &LiquidityMonitor {
        &self.liquidity
    }

    pub fn security(&self) -> &SecurityValidator {
        &self.security
    }

    /// 캐시 정리와 헬스 tick을 주기적으로 실행하는 태스크를 시작합니다.
    pub fn spawn_maintenance(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let aggregator = Arc::clone(&self.aggregator);
        let cleanup_every = self.config.cache.cleanup_interval();
        let tick_every = self.config.health.tick_interval();

        tokio::spawn(async move {
            let mut cleanup_ticker = tokio::time::interval(cleanup_every);
            let mut health_ticker = tokio::time::interval(tick_every);
            // 첫 tick은 즉시 완료되므로 건너뜀
            cleanup_ticker.tick().await;
            health_ticker.tick().await;

            info!(
                cleanup_secs = cleanup_every.as_secs(),
                health_tick_secs = tick_every.as_secs(),
                "Gateway maintenance started"
            );

            loop {
                tokio::select! {
                    _ = cleanup_ticker.tick() => {
                        let removed = cache.cleanup();
                        if removed > 0 {
                            debug!(removed, "Expired cache entries removed");
                        }
                    }

                    _ = health_ticker.tick() => {
                        let recovered = aggregator.tick_health();
                        if !recovered.is_empty() {
                            debug!(?recovered, "Health tick re-enabled exchanges");
                        }
                    }

                    _ = shutdown.cancelled() => {
                        info!("Gateway maintenance stopped");
                        break;
                    }
                }
            }
        })
    }
}
