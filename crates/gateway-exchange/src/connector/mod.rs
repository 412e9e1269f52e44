//! 거래소 캔들 소스 구현.

pub mod binance;
pub mod bybit;
mod http;
pub mod okx;
pub mod simulated;

pub use binance::BinanceSource;
pub use bybit::BybitSource;
pub use okx::OkxSource;
pub use simulated::SimulatedCandleSource;

use gateway_core::{ExchangeConfig, ExchangeKind};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ExchangeResult;
use crate::traits::CandleSource;

/// 설정으로부터 캔들 소스를 생성합니다.
pub fn build_source(config: &ExchangeConfig, timeout: Duration) -> ExchangeResult<Arc<dyn CandleSource>> {
    let base_url = config.base_url.as_deref();
    let source: Arc<dyn CandleSource> = match config.kind {
        ExchangeKind::Binance => Arc::new(BinanceSource::new(&config.name, base_url, timeout)?),
        ExchangeKind::Bybit => Arc::new(BybitSource::new(&config.name, base_url, timeout)?),
        ExchangeKind::Okx => Arc::new(OkxSource::new(&config.name, base_url, timeout)?),
        ExchangeKind::Simulated => Arc::new(SimulatedCandleSource::new(&config.name)),
    };
    Ok(source)
}
