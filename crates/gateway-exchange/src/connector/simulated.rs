//! 오프라인 실행용 시뮬레이션 캔들 소스.
//!
//! 심볼별 마지막 가격에서 출발하는 랜덤 워크로 캔들을 생성합니다.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use gateway_core::{Ohlcv, Timeframe};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

use crate::error::ExchangeResult;
use crate::traits::CandleSource;

/// 시뮬레이션 캔들 소스.
pub struct SimulatedCandleSource {
    name: String,
    start_price: Decimal,
    /// 캔들당 최대 변동률 (0.01 = 1%)
    volatility: f64,
    state: Mutex<SimState>,
}

struct SimState {
    rng: StdRng,
    last_prices: HashMap<String, Decimal>,
}

impl SimulatedCandleSource {
    /// 새 소스 생성.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rng(name, StdRng::from_entropy())
    }

    /// 고정 시드로 생성 (재현 가능한 출력).
    pub fn with_seed(name: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(name, StdRng::seed_from_u64(seed))
    }

    fn with_rng(name: impl Into<String>, rng: StdRng) -> Self {
        Self {
            name: name.into(),
            start_price: dec!(50000),
            volatility: 0.005,
            state: Mutex::new(SimState {
                rng,
                last_prices: HashMap::new(),
            }),
        }
    }

    /// 시작 가격 설정.
    pub fn with_start_price(mut self, price: Decimal) -> Self {
        self.start_price = price;
        self
    }

    /// 변동률 설정.
    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility.abs();
        self
    }

    fn generate(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Vec<Ohlcv> {
        let mut state = self.state.lock();
        let SimState { rng, last_prices } = &mut *state;

        let mut current_price = *last_prices
            .get(symbol)
            .unwrap_or(&self.start_price);

        let tf_duration = ChronoDuration::seconds(timeframe.duration().as_secs() as i64);
        let mut current_time = Utc::now() - tf_duration * count as i32;

        let mut candles = Vec::with_capacity(count);
        for _ in 0..count {
            let change_pct = (rng.gen::<f64>() - 0.5) * 2.0 * self.volatility;
            let change = current_price * Decimal::from_f64(change_pct).unwrap_or_default();

            let open = current_price;
            // 음수 가격 방지
            let close = (current_price + change).max(dec!(0.00000001));

            let wick = |r: f64| current_price * Decimal::from_f64(r * self.volatility).unwrap_or_default();
            let high = open.max(close) + wick(rng.gen::<f64>());
            let low = (open.min(close) - wick(rng.gen::<f64>())).max(Decimal::ZERO);

            let volume = Decimal::from_f64(rng.gen_range(10.0..1000.0))
                .unwrap_or(dec!(100))
                .round_dp(4);

            candles.push(Ohlcv {
                timestamp: current_time,
                open: open.round_dp(8),
                high: high.round_dp(8),
                low: low.round_dp(8),
                close: close.round_dp(8),
                volume,
                exchange: self.name.clone(),
            });

            current_price = close.round_dp(8);
            current_time += tf_duration;
        }

        last_prices.insert(symbol.to_string(), current_price);
        candles
    }
}

#[async_trait]
impl CandleSource for SimulatedCandleSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Ohlcv>> {
        Ok(self.generate(symbol, timeframe, limit.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generates_consistent_candles() {
        let source = SimulatedCandleSource::with_seed("sim", 7).with_start_price(dec!(100));
        let candles = source.fetch_candles("BTC/USDT", Timeframe::M5, 50).await.unwrap();

        assert_eq!(candles.len(), 50);
        for pair in candles.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
            assert_eq!(pair[0].close, pair[1].open);
        }
        for c in &candles {
            assert!(c.high >= c.open.max(c.close));
            assert!(c.low <= c.open.min(c.close));
            assert!(c.volume > Decimal::ZERO);
        }
    }

    #[tokio::test]
    async fn test_walk_continues_between_calls() {
        let source = SimulatedCandleSource::with_seed("sim", 1).with_start_price(dec!(100));
        let first = source.fetch_candles("ETH/USDT", Timeframe::M1, 3).await.unwrap();
        let second = source.fetch_candles("ETH/USDT", Timeframe::M1, 1).await.unwrap();
        assert_eq!(second[0].open, first[2].close);
    }
}
