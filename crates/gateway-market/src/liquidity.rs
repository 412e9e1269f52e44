//! 유동성 모니터.
//!
//! 집계 가격과 최근 24시간 1시간봉으로 0~100 유동성 점수를 계산합니다.
//! 자체 I/O는 없고 집계기의 결과만 사용합니다.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;

use gateway_core::{GatewayResult, Ohlcv, PriceData, RequestPriority, Timeframe};

use crate::aggregator::ExchangeAggregator;

/// 분석에 쓰는 1시간봉 개수.
pub const LIQUIDITY_WINDOW_HOURS: usize = 24;

/// 정상 판정 최소 점수.
const HEALTHY_MIN_SCORE: f64 = 60.0;

/// 정상 판정 최대 스프레드 (%).
const HEALTHY_MAX_SPREAD_PCT: Decimal = dec!(2);

/// 항목별 점수.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityBreakdown {
    /// 거래대금 (0~40)
    pub volume: f64,
    /// 소스 다양성 (0~20)
    pub diversity: f64,
    /// 스프레드 (0~25)
    pub spread: f64,
    /// 추정 호가 깊이 (0~15)
    pub depth: f64,
}

/// 유동성 분석 결과.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidityReport {
    pub symbol: String,
    pub score: f64,
    pub healthy: bool,
    pub volume_24h_usd: Decimal,
    pub spread_pct: Decimal,
    pub depth_usd: Decimal,
    pub sources: usize,
    pub breakdown: LiquidityBreakdown,
    pub timestamp: DateTime<Utc>,
}

/// 가격과 캔들로 유동성 점수를 계산합니다.
///
/// `configured`는 설정된 거래소 수이며 다양성 점수의 분모입니다.
pub fn score_liquidity(price: &PriceData, candles: &[Ohlcv], configured: usize) -> LiquidityReport {
    let volume_24h_usd: Decimal = candles.iter().map(Ohlcv::quote_volume).sum();
    let spread_pct = price.spread_pct();
    // 호가 데이터가 없으므로 시간당 거래대금의 절반으로 근사
    let depth_usd = volume_24h_usd / Decimal::from(LIQUIDITY_WINDOW_HOURS as u64) * dec!(0.5);

    let breakdown = LiquidityBreakdown {
        volume: volume_score(volume_24h_usd),
        diversity: diversity_score(price.sources.len(), configured),
        spread: spread_score(spread_pct),
        depth: depth_score(depth_usd),
    };
    let score = round2(breakdown.volume + breakdown.diversity + breakdown.spread + breakdown.depth);

    LiquidityReport {
        symbol: price.symbol.clone(),
        score,
        healthy: score >= HEALTHY_MIN_SCORE && spread_pct < HEALTHY_MAX_SPREAD_PCT,
        volume_24h_usd,
        spread_pct,
        depth_usd,
        sources: price.sources.len(),
        breakdown,
        timestamp: Utc::now(),
    }
}

fn volume_score(volume: Decimal) -> f64 {
    if volume >= dec!(100_000_000) {
        40.0
    } else if volume >= dec!(10_000_000) {
        30.0
    } else if volume >= dec!(1_000_000) {
        20.0
    } else if volume >= dec!(100_000) {
        10.0
    } else {
        0.0
    }
}

fn diversity_score(sources: usize, configured: usize) -> f64 {
    if configured == 0 {
        return 0.0;
    }
    (sources.min(configured) as f64 / configured as f64) * 20.0
}

fn spread_score(spread_pct: Decimal) -> f64 {
    if spread_pct < dec!(0.1) {
        25.0
    } else if spread_pct < dec!(0.5) {
        20.0
    } else if spread_pct < dec!(1) {
        15.0
    } else if spread_pct < dec!(2) {
        8.0
    } else {
        0.0
    }
}

fn depth_score(depth: Decimal) -> f64 {
    if depth >= dec!(1_000_000) {
        15.0
    } else if depth >= dec!(100_000) {
        10.0
    } else if depth >= dec!(10_000) {
        5.0
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(2))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// 집계기 위의 유동성 모니터.
#[derive(Clone)]
pub struct LiquidityMonitor {
    aggregator: Arc<ExchangeAggregator>,
}

impl LiquidityMonitor {
    pub fn new(aggregator: Arc<ExchangeAggregator>) -> Self {
        Self { aggregator }
    }

    /// 심볼 유동성 분석. 집계기 에러는 그대로 전파합니다.
    pub async fn analyze(&self, symbol: &str) -> GatewayResult<LiquidityReport> {
        let price = self.aggregator.get_aggregated_price(symbol).await?;
        let candles = self
            .aggregator
            .get_ohlcv_with_priority(symbol, Timeframe::H1, LIQUIDITY_WINDOW_HOURS, RequestPriority::Low)
            .await?;

        Ok(score_liquidity(
            &price,
            &candles,
            self.aggregator.exchange_names().len(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::SourcePrice;

    fn price_data(prices: &[(&str, Decimal)], failed: usize) -> PriceData {
        let observations: Vec<SourcePrice> = prices
            .iter()
            .map(|(ex, p)| SourcePrice {
                exchange: ex.to_string(),
                price: *p,
                latency_ms: 10,
            })
            .collect();
        let values: Vec<Decimal> = observations.iter().map(|o| o.price).collect();
        let median = crate::pricing::median(&values).unwrap_or(Decimal::ZERO);
        PriceData {
            symbol: "BTC/USDT".to_string(),
            price: median,
            confidence: 90.0,
            sources: observations.iter().map(|o| o.exchange.clone()).collect(),
            deviation: crate::pricing::max_deviation(&values, median),
            observations,
            errors: (0..failed)
                .map(|i| gateway_core::SourceError::new(format!("ex{}", i), "timeout"))
                .collect(),
            timestamp: Utc::now(),
        }
    }

    fn hourly(volume: Decimal, close: Decimal) -> Vec<Ohlcv> {
        (0..24)
            .map(|_| Ohlcv {
                timestamp: Utc::now(),
                open: close,
                high: close,
                low: close,
                close,
                volume,
                exchange: "binance".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_deep_market_scores_high() {
        let price = price_data(
            &[("binance", dec!(50000)), ("bybit", dec!(50010)), ("okx", dec!(49995))],
            0,
        );
        // 24 * 100 * 50000 = 120M
        let report = score_liquidity(&price, &hourly(dec!(100), dec!(50000)), 3);

        assert_eq!(report.volume_24h_usd, dec!(120_000_000));
        assert_eq!(report.depth_usd, dec!(2_500_000));
        assert_eq!(report.breakdown.volume, 40.0);
        assert_eq!(report.breakdown.diversity, 20.0);
        assert_eq!(report.breakdown.spread, 25.0);
        assert_eq!(report.breakdown.depth, 15.0);
        assert_eq!(report.score, 100.0);
        assert!(report.healthy);
    }

    #[test]
    fn test_thin_market_unhealthy() {
        let price = price_data(&[("binance", dec!(1.00)), ("bybit", dec!(1.03))], 1);
        let report = score_liquidity(&price, &hourly(dec!(1000), dec!(1)), 3);

        // 24k 거래대금, 스프레드 약 3%
        assert_eq!(report.breakdown.volume, 0.0);
        assert_eq!(report.breakdown.spread, 0.0);
        assert!((report.breakdown.diversity - 13.33).abs() < 0.01);
        assert_eq!(report.breakdown.depth, 0.0);
        assert!(!report.healthy);
    }

    #[test]
    fn test_wide_spread_blocks_healthy_even_with_high_score() {
        // 스프레드 2% 이상이면 점수와 무관하게 비정상
        let price = price_data(&[("binance", dec!(100)), ("bybit", dec!(102.5))], 0);
        let report = score_liquidity(&price, &hourly(dec!(1_000_000), dec!(100)), 2);
        assert!(report.score >= 60.0);
        assert!(report.spread_pct >= dec!(2));
        assert!(!report.healthy);
    }

    #[test]
    fn test_empty_candles() {
        let price = price_data(&[("binance", dec!(100)), ("bybit", dec!(100))], 0);
        let report = score_liquidity(&price, &[], 2);
        assert_eq!(report.volume_24h_usd, Decimal::ZERO);
        assert_eq!(report.score, 45.0);
        assert!(!report.healthy);
    }
}
