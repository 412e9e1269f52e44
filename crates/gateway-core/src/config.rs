//! 설정 관리.
//!
//! 기본값 → TOML 파일 → `GATEWAY__` 접두사 환경 변수 순으로 덮어씁니다.
//! 예: `GATEWAY__SERVER__PORT=8080`

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};
use crate::types::Timeframe;

/// 게이트웨이 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// Rate limiter / 서킷 브레이커 설정
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// 거래소 헬스 상태 설정
    #[serde(default)]
    pub health: HealthConfig,
    /// 집계기 설정
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// 거래소 목록 (배열 순서가 OHLCV 폴백 우선순위)
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<ExchangeConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            health: HealthConfig::default(),
            aggregator: AggregatorConfig::default(),
            exchanges: default_exchanges(),
        }
    }
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// HTTP 요청 전체 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// 소켓 주소 생성.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 캐시 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 최대 엔트리 수
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// 합성 가격 TTL (초)
    #[serde(default = "default_price_ttl")]
    pub price_ttl_secs: u64,
    /// OHLCV TTL (초)
    #[serde(default = "default_ohlcv_ttl")]
    pub ohlcv_ttl_secs: u64,
    /// 만료 엔트리 정리 주기 (초)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            price_ttl_secs: default_price_ttl(),
            ohlcv_ttl_secs: default_ohlcv_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl CacheConfig {
    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }

    pub fn ohlcv_ttl(&self) -> Duration {
        Duration::from_secs(self.ohlcv_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_max_entries() -> usize {
    1000
}
fn default_price_ttl() -> u64 {
    10
}
fn default_ohlcv_ttl() -> u64 {
    60
}
fn default_cleanup_interval() -> u64 {
    60
}

/// 서킷 브레이커 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// 서킷을 여는 연속 실패 횟수
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// 서킷이 열린 뒤 자동으로 닫히기까지의 시간 (초)
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

impl RateLimitConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_failure_threshold() -> u32 {
    10
}
fn default_cooldown() -> u64 {
    300
}

/// 거래소 헬스 상태 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// 비정상 전환 연속 실패 횟수 (일반 실패)
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    /// 비정상 전환 연속 실패 횟수 (지역 제한)
    #[serde(default = "default_geo_threshold")]
    pub geo_threshold: u32,
    /// 지역 제한 자동 복구 대기 시간 (초)
    #[serde(default = "default_geo_recovery")]
    pub geo_recovery_secs: u64,
    /// 헬스 tick 주기 (초)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: default_unhealthy_threshold(),
            geo_threshold: default_geo_threshold(),
            geo_recovery_secs: default_geo_recovery(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

impl HealthConfig {
    pub fn geo_recovery(&self) -> Duration {
        Duration::from_secs(self.geo_recovery_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

fn default_unhealthy_threshold() -> u32 {
    5
}
fn default_geo_threshold() -> u32 {
    3
}
fn default_geo_recovery() -> u64 {
    300
}
fn default_tick_interval() -> u64 {
    30
}

/// 집계기 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AggregatorConfig {
    /// 거래소 호출당 타임아웃 (밀리초)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// 가격 합성에 필요한 최소 소스 수
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    /// 최신 가격 조회에 사용할 타임프레임
    #[serde(default = "default_price_timeframe")]
    pub price_timeframe: Timeframe,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            min_sources: default_min_sources(),
            price_timeframe: default_price_timeframe(),
        }
    }
}

impl AggregatorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout() -> u64 {
    10_000
}
fn default_min_sources() -> usize {
    2
}
fn default_price_timeframe() -> Timeframe {
    Timeframe::M1
}

/// 거래소 커넥터 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Binance,
    Bybit,
    Okx,
    Simulated,
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// 거래소 이름 (rate limiter/헬스 키)
    pub name: String,
    /// 커넥터 종류
    pub kind: ExchangeKind,
    /// 분당 요청 한도
    #[serde(default = "default_rate_limit")]
    pub requests_per_minute: u32,
    /// 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// REST API 기본 URL 재정의
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ExchangeConfig {
    pub fn new(name: impl Into<String>, kind: ExchangeKind, requests_per_minute: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            requests_per_minute,
            enabled: true,
            base_url: None,
        }
    }
}

/// 거래소 분당 요청 한도 기본값.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 1200;

/// 집계 가격에 필요한 최소 관측 수의 하한.
pub const MIN_PRICE_SOURCES: usize = 2;

fn default_rate_limit() -> u32 {
    DEFAULT_REQUESTS_PER_MINUTE
}
fn default_enabled() -> bool {
    true
}

fn default_exchanges() -> Vec<ExchangeConfig> {
    vec![
        ExchangeConfig::new("binance", ExchangeKind::Binance, 1200),
        ExchangeConfig::new("bybit", ExchangeKind::Bybit, 600),
        ExchangeConfig::new("okx", ExchangeKind::Okx, 600),
    ]
}

impl GatewayConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.request_timeout_secs", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: GatewayConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> GatewayResult<Self> {
        Self::load("config/default.toml")
    }

    /// 활성화된 거래소만 우선순위 순서대로 반환합니다.
    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }

    /// 설정 값의 일관성을 검증합니다.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.enabled_exchanges().next().is_none() {
            return Err(GatewayError::Config(
                "at least one exchange must be enabled".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for exchange in &self.exchanges {
            if !seen.insert(exchange.name.as_str()) {
                return Err(GatewayError::Config(format!(
                    "duplicate exchange name: {}",
                    exchange.name
                )));
            }
            if exchange.requests_per_minute == 0 {
                return Err(GatewayError::Config(format!(
                    "requests_per_minute must be positive for {}",
                    exchange.name
                )));
            }
        }

        if self.aggregator.min_sources < MIN_PRICE_SOURCES {
            return Err(GatewayError::Config(format!(
                "aggregator.min_sources must be at least {}",
                MIN_PRICE_SOURCES
            )));
        }

        if self.cache.max_entries == 0 {
            return Err(GatewayError::Config(
                "cache.max_entries must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exchanges.len(), 3);
        assert_eq!(config.exchanges[0].name, "binance");
        assert_eq!(config.exchanges[0].requests_per_minute, 1200);
        assert_eq!(config.cache.price_ttl(), Duration::from_secs(10));
        assert_eq!(config.cache.ohlcv_ttl(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.failure_threshold, 10);
        assert_eq!(config.health.geo_recovery(), Duration::from_secs(300));
        assert_eq!(config.aggregator.price_timeframe, Timeframe::M1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GatewayConfig::default();
        config.exchanges[1].name = "binance".to_string();
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.exchanges[0].requests_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        for exchange in &mut config.exchanges {
            exchange.enabled = false;
        }
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.aggregator.min_sources = 0;
        assert!(config.validate().is_err());

        // 단일 관측으로는 중앙값 교차 검증이 되지 않음
        let mut config = GatewayConfig::default();
        config.aggregator.min_sources = 1;
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));

        let mut config = GatewayConfig::default();
        config.aggregator.min_sources = 3;
        assert!(config.validate().is_ok());

        let mut config = GatewayConfig::default();
        config.cache.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = std::env::temp_dir().join(format!("gateway-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gateway.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
host = "0.0.0.0"
port = 8080

[cache]
price_ttl_secs = 5

[[exchanges]]
name = "sim-a"
kind = "simulated"
requests_per_minute = 60

[[exchanges]]
name = "okx"
kind = "okx"
enabled = false
"#
        )
        .unwrap();

        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.price_ttl_secs, 5);
        assert_eq!(config.cache.ohlcv_ttl_secs, 60);
        assert_eq!(config.exchanges.len(), 2);
        assert_eq!(config.exchanges[0].kind, ExchangeKind::Simulated);
        assert_eq!(config.exchanges[1].requests_per_minute, 1200);
        assert_eq!(config.enabled_exchanges().count(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = GatewayConfig::load("/nonexistent/gateway.toml").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.exchanges.len(), 3);
    }
}
