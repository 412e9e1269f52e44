//! 업스트림 거래소 연결과 admission control.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `CandleSource` trait: 거래소별 캔들 조회 인터페이스
//! - Binance / Bybit / OKX REST 소스와 시뮬레이션 소스
//! - `ExchangeError`: 경계에서 분류된 업스트림 실패
//! - Circuit breaker: 연속 실패 시 빠른 실패
//! - `RateLimiter`: 거래소별 우선순위 Token Bucket

pub mod circuit_breaker;
pub mod classify;
pub mod connector;
pub mod error;
pub mod rate_limiter;
mod token_bucket;
pub mod traits;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitOpenError, CircuitState,
};
pub use classify::{classify_http_failure, is_geo_restriction};
pub use connector::{build_source, BinanceSource, BybitSource, OkxSource, SimulatedCandleSource};
pub use error::*;
pub use rate_limiter::{RateLimitStats, RateLimiter};
pub use traits::CandleSource;
