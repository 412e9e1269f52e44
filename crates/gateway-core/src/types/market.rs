//! 시장 데이터 타입.
//!
//! - `Ohlcv` - 단일 거래소에서 받은 캔들
//! - `PriceData` - 여러 거래소 가격을 합성한 결과
//! - `MarketFrames` - 심볼 하나의 여러 타임프레임 캔들 묶음

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::Timeframe;

/// OHLCV 캔들스틱 데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    /// 캔들 시작 시간
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량 (기준 자산 단위)
    pub volume: Decimal,
    /// 데이터를 제공한 거래소
    pub exchange: String,
}

impl Ohlcv {
    /// 호가 자산 기준 거래대금 (거래량 × 종가).
    pub fn quote_volume(&self) -> Decimal {
        self.volume * self.close
    }

    /// 캔들의 변동폭 비율 ((고가 - 저가) / 저가).
    pub fn range_ratio(&self) -> Decimal {
        if self.low.is_zero() {
            return Decimal::ZERO;
        }
        (self.high - self.low) / self.low
    }
}

/// 개별 거래소에서 관측한 가격.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePrice {
    pub exchange: String,
    pub price: Decimal,
    pub latency_ms: u64,
}

/// 개별 거래소 호출 실패 기록.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub exchange: String,
    pub message: String,
}

impl SourceError {
    pub fn new(exchange: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exchange, self.message)
    }
}

/// 합성 가격.
///
/// 여러 거래소 관측값의 중앙값과, 관측값 간 합의 정도를 나타내는 신뢰도를 담습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    /// 심볼 (예: "BTC/USDT")
    pub symbol: String,
    /// 관측 가격의 중앙값
    pub price: Decimal,
    /// 신뢰도 (0-100)
    pub confidence: f64,
    /// 가격을 제공한 거래소 목록
    pub sources: Vec<String>,
    /// 중앙값 대비 최대 상대 편차 (0.01 = 1%)
    pub deviation: Decimal,
    /// 거래소별 관측값
    pub observations: Vec<SourcePrice>,
    /// 실패한 거래소와 사유
    #[serde(default)]
    pub errors: Vec<SourceError>,
    /// 계산 시각
    pub timestamp: DateTime<Utc>,
}

impl PriceData {
    /// 편차를 백분율로 반환합니다.
    pub fn deviation_pct(&self) -> Decimal {
        self.deviation * Decimal::ONE_HUNDRED
    }

    /// 관측값 최고가와 최저가의 차이를 중앙값 대비 백분율로 반환합니다.
    pub fn spread_pct(&self) -> Decimal {
        let max = self.observations.iter().map(|o| o.price).max();
        let min = self.observations.iter().map(|o| o.price).min();
        match (max, min) {
            (Some(max), Some(min)) if !self.price.is_zero() => {
                (max - min) / self.price * Decimal::ONE_HUNDRED
            }
            _ => Decimal::ZERO,
        }
    }
}

/// 여러 타임프레임의 캔들 묶음.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFrames {
    pub symbol: String,
    pub frames: BTreeMap<Timeframe, Vec<Ohlcv>>,
    /// 실패한 타임프레임과 사유
    #[serde(default)]
    pub failures: BTreeMap<Timeframe, String>,
}

/// Rate limiter 대기열 우선순위.
///
/// `High > Normal > Low` 순으로 정렬됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestPriority::Low => write!(f, "low"),
            RequestPriority::Normal => write!(f, "normal"),
            RequestPriority::High => write!(f, "high"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal, low: Decimal, close: Decimal, volume: Decimal) -> Ohlcv {
        Ohlcv {
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume,
            exchange: "test".to_string(),
        }
    }

    #[test]
    fn test_quote_volume_and_range() {
        let c = candle(dec!(110), dec!(100), dec!(105), dec!(2));
        assert_eq!(c.quote_volume(), dec!(210));
        assert_eq!(c.range_ratio(), dec!(0.1));

        let zero_low = candle(dec!(1), dec!(0), dec!(1), dec!(1));
        assert_eq!(zero_low.range_ratio(), Decimal::ZERO);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(RequestPriority::High > RequestPriority::Normal);
        assert!(RequestPriority::Normal > RequestPriority::Low);
    }

    #[test]
    fn test_spread_pct() {
        let data = PriceData {
            symbol: "BTC/USDT".to_string(),
            price: dec!(100),
            confidence: 90.0,
            sources: vec!["a".into(), "b".into(), "c".into()],
            deviation: dec!(0.01),
            observations: vec![
                SourcePrice { exchange: "a".into(), price: dec!(99), latency_ms: 10 },
                SourcePrice { exchange: "b".into(), price: dec!(100), latency_ms: 10 },
                SourcePrice { exchange: "c".into(), price: dec!(101), latency_ms: 10 },
            ],
            errors: vec![],
            timestamp: Utc::now(),
        };
        assert_eq!(data.spread_pct(), dec!(2));
        assert_eq!(data.deviation_pct(), dec!(1));
    }
}
