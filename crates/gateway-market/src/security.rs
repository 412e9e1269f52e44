//! 보안 검증기.
//!
//! 가격 편차, 유동성, 거래량 이상, 급등락(가격 범위) 네 가지 검사를 합산해
//! 0~100 위험 점수와 등급을 산출합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;

use gateway_core::{GatewayResult, Ohlcv, PriceData, RequestPriority, Timeframe};

use crate::liquidity::{score_liquidity, LiquidityMonitor, LiquidityReport, LIQUIDITY_WINDOW_HOURS};
use crate::ExchangeAggregator;

/// 위험 등급.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Caution,
    Risky,
    Dangerous,
}

impl RiskLevel {
    /// 위험 점수 → 등급.
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=24 => RiskLevel::Safe,
            25..=49 => RiskLevel::Caution,
            50..=74 => RiskLevel::Risky,
            _ => RiskLevel::Dangerous,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Safe => "SAFE",
            RiskLevel::Caution => "CAUTION",
            RiskLevel::Risky => "RISKY",
            RiskLevel::Dangerous => "DANGEROUS",
        };
        write!(f, "{}", s)
    }
}

/// 개별 검사 결과.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityCheck {
    pub name: &'static str,
    pub passed: bool,
    /// 위험 점수 기여분
    pub risk: u32,
    pub message: String,
}

impl SecurityCheck {
    fn new(name: &'static str, risk: u32, message: String) -> Self {
        Self {
            name,
            passed: risk == 0,
            risk,
            message,
        }
    }
}

/// 보안 검증 결과.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub symbol: String,
    pub risk_score: u32,
    pub level: RiskLevel,
    pub checks: Vec<SecurityCheck>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityReport {
    pub fn is_safe(&self) -> bool {
        self.level == RiskLevel::Safe
    }
}

/// 가격, 캔들, 유동성 결과로 위험 점수를 계산합니다.
pub fn assess_security(
    price: &PriceData,
    candles: &[Ohlcv],
    liquidity: &LiquidityReport,
) -> SecurityReport {
    let checks = vec![
        check_price_deviation(price),
        check_liquidity(liquidity),
        check_volume_anomaly(candles),
        check_price_range(candles),
    ];
    let risk_score = checks.iter().map(|c| c.risk).sum::<u32>().min(100);

    SecurityReport {
        symbol: price.symbol.clone(),
        risk_score,
        level: RiskLevel::from_score(risk_score),
        checks,
        timestamp: Utc::now(),
    }
}

fn check_price_deviation(price: &PriceData) -> SecurityCheck {
    let pct = price.deviation_pct().round_dp(4);
    let risk = if pct > dec!(5) {
        30
    } else if pct > dec!(2) {
        15
    } else if pct > dec!(1) {
        5
    } else {
        0
    };
    SecurityCheck::new(
        "price_deviation",
        risk,
        format!("max source deviation {}% across {} sources", pct, price.sources.len()),
    )
}

fn check_liquidity(liquidity: &LiquidityReport) -> SecurityCheck {
    let risk = if liquidity.score < 30.0 {
        30
    } else if liquidity.score < 60.0 {
        15
    } else {
        0
    };
    SecurityCheck::new(
        "liquidity",
        risk,
        format!("liquidity score {:.2}", liquidity.score),
    )
}

/// 마지막 봉 거래량과 이전 봉 평균 거래량 비교.
fn check_volume_anomaly(candles: &[Ohlcv]) -> SecurityCheck {
    let total: Decimal = candles.iter().map(|c| c.volume).sum();
    if total.is_zero() {
        return SecurityCheck::new("volume_anomaly", 20, "no trading volume".to_string());
    }

    let Some((last, prior)) = candles.split_last() else {
        return SecurityCheck::new("volume_anomaly", 20, "no trading volume".to_string());
    };
    if prior.is_empty() {
        return SecurityCheck::new(
            "volume_anomaly",
            0,
            "not enough history to compare".to_string(),
        );
    }

    let prior_mean = prior.iter().map(|c| c.volume).sum::<Decimal>() / Decimal::from(prior.len() as u64);
    if prior_mean.is_zero() {
        // 거래가 없다가 갑자기 발생
        return SecurityCheck::new(
            "volume_anomaly",
            20,
            format!("volume {} after idle period", last.volume),
        );
    }

    let ratio = (last.volume / prior_mean).round_dp(2);
    let risk = if ratio > dec!(5) {
        20
    } else if ratio > dec!(3) {
        10
    } else {
        0
    };
    SecurityCheck::new(
        "volume_anomaly",
        risk,
        format!("last hour volume {}x prior average", ratio),
    )
}

/// 단일 봉 최대 (고가 - 저가) / 저가.
fn check_price_range(candles: &[Ohlcv]) -> SecurityCheck {
    let max_range = candles
        .iter()
        .map(Ohlcv::range_ratio)
        .max()
        .unwrap_or(Decimal::ZERO);
    let pct = (max_range * Decimal::ONE_HUNDRED).round_dp(2);
    let risk = if max_range > dec!(0.20) {
        25
    } else if max_range > dec!(0.10) {
        10
    } else {
        0
    };
    SecurityCheck::new(
        "price_range",
        risk,
        format!("largest single candle range {}%", pct),
    )
}

/// 집계기 위의 보안 검증기.
#[derive(Clone)]
pub struct SecurityValidator {
    liquidity: LiquidityMonitor,
    aggregator: std::sync::Arc<ExchangeAggregator>,
}

impl SecurityValidator {
    pub fn new(aggregator: std::sync::Arc<ExchangeAggregator>) -> Self {
        Self {
            liquidity: LiquidityMonitor::new(aggregator.clone()),
            aggregator,
        }
    }

    /// 심볼 보안 검증. 집계기 에러는 그대로 전파합니다.
    pub async fn validate(&self, symbol: &str) -> GatewayResult<SecurityReport> {
        let price = self.aggregator.get_aggregated_price(symbol).await?;
        let candles = self
            .aggregator
            .get_ohlcv_with_priority(symbol, Timeframe::H1, LIQUIDITY_WINDOW_HOURS, RequestPriority::Low)
            .await?;
        let liquidity = score_liquidity(&price, &candles, self.aggregator.exchange_names().len());

        Ok(assess_security(&price, &candles, &liquidity))
    }

    pub fn liquidity(&self) -> &LiquidityMonitor {
        &self.liquidity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::SourcePrice;

    fn price_data(prices: &[Decimal]) -> PriceData {
        let median = crate::pricing::median(prices).unwrap_or(Decimal::ZERO);
        PriceData {
            symbol: "ETH/USDT".to_string(),
            price: median,
            confidence: 90.0,
            sources: (0..prices.len()).map(|i| format!("ex{}", i)).collect(),
            deviation: crate::pricing::max_deviation(prices, median),
            observations: prices
                .iter()
                .enumerate()
                .map(|(i, p)| SourcePrice {
                    exchange: format!("ex{}", i),
                    price: *p,
                    latency_ms: 5,
                })
                .collect(),
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    fn candle(low: Decimal, high: Decimal, volume: Decimal) -> Ohlcv {
        Ohlcv {
            timestamp: Utc::now(),
            open: low,
            high,
            low,
            close: high,
            volume,
            exchange: "ex0".to_string(),
        }
    }

    fn steady(n: usize, volume: Decimal) -> Vec<Ohlcv> {
        (0..n).map(|_| candle(dec!(3000), dec!(3010), volume)).collect()
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(24), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Caution);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::Risky);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::Dangerous);
        assert_eq!(RiskLevel::Dangerous.to_string(), "DANGEROUS");
    }

    #[test]
    fn test_healthy_market_is_safe() {
        let price = price_data(&[dec!(3000), dec!(3001), dec!(3002)]);
        let candles = steady(24, dec!(10_000));
        let liquidity = score_liquidity(&price, &candles, 3);
        let report = assess_security(&price, &candles, &liquidity);

        assert_eq!(report.risk_score, 0, "{:?}", report.checks);
        assert!(report.is_safe());
        assert!(report.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn test_volume_spike_and_flash_crash() {
        let price = price_data(&[dec!(3000), dec!(3001)]);
        let mut candles = steady(23, dec!(10_000));
        // 평균의 6배 거래량, 25% 범위
        candles.push(candle(dec!(2400), dec!(3000), dec!(60_000)));
        let liquidity = score_liquidity(&price, &candles, 2);
        let report = assess_security(&price, &candles, &liquidity);

        let volume = report.checks.iter().find(|c| c.name == "volume_anomaly").unwrap();
        assert_eq!(volume.risk, 20);
        let range = report.checks.iter().find(|c| c.name == "price_range").unwrap();
        assert_eq!(range.risk, 25);
        assert_eq!(report.risk_score, 45);
        assert_eq!(report.level, RiskLevel::Caution);
    }

    #[test]
    fn test_zero_volume_and_divergent_prices() {
        let price = price_data(&[dec!(100), dec!(106), dec!(100)]);
        let candles = steady(24, Decimal::ZERO);
        let liquidity = score_liquidity(&price, &candles, 3);
        let report = assess_security(&price, &candles, &liquidity);

        // 편차 6% → 30, 유동성 낮음 → 30 또는 15, 거래량 0 → 20
        let deviation = report.checks.iter().find(|c| c.name == "price_deviation").unwrap();
        assert_eq!(deviation.risk, 30);
        let volume = report.checks.iter().find(|c| c.name == "volume_anomaly").unwrap();
        assert_eq!(volume.risk, 20);
        assert!(report.risk_score >= 65);
        assert!(matches!(report.level, RiskLevel::Risky | RiskLevel::Dangerous));
    }

    #[test]
    fn test_risk_score_capped() {
        let price = price_data(&[dec!(100), dec!(120), dec!(100)]);
        let mut candles = steady(23, Decimal::ZERO);
        candles.push(candle(dec!(50), dec!(100), dec!(1)));
        let liquidity = score_liquidity(&price, &candles, 3);
        let report = assess_security(&price, &candles, &liquidity);

        // 30 + 30 + 20 + 25 = 105 → 100
        assert_eq!(report.risk_score, 100);
        assert_eq!(report.level, RiskLevel::Dangerous);
    }
}
