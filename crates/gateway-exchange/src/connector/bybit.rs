//! Bybit v5 현물 캔들 소스.

use async_trait::async_trait;
use gateway_core::{Ohlcv, Timeframe};
use serde::Deserialize;
use std::time::Duration;

use super::http::{parse_decimal, parse_timestamp_ms, RestClient};
use crate::classify::classify_api_message;
use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::CandleSource;

/// Bybit REST 기본 URL.
pub const BYBIT_BASE_URL: &str = "https://api.bybit.com";

const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    ret_msg: String,
    #[serde(default)]
    result: Option<BybitKlineResult>,
}

#[derive(Debug, Deserialize)]
struct BybitKlineResult {
    /// [startTime, open, high, low, close, volume, turnover], 최신 순
    #[serde(default)]
    list: Vec<[String; 7]>,
}

/// Bybit 캔들 소스.
pub struct BybitSource {
    name: String,
    rest: RestClient,
}

impl BybitSource {
    pub fn new(
        name: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> ExchangeResult<Self> {
        Ok(Self {
            name: name.into(),
            rest: RestClient::new(base_url.unwrap_or(BYBIT_BASE_URL), timeout)?,
        })
    }

    fn to_ohlcv(&self, row: &[String; 7]) -> ExchangeResult<Ohlcv> {
        let start: i64 = row[0]
            .parse()
            .map_err(|_| ExchangeError::Malformed(format!("invalid start time: {:?}", row[0])))?;
        Ok(Ohlcv {
            timestamp: parse_timestamp_ms(start)?,
            open: parse_decimal("open", &row[1])?,
            high: parse_decimal("high", &row[2])?,
            low: parse_decimal("low", &row[3])?,
            close: parse_decimal("close", &row[4])?,
            volume: parse_decimal("volume", &row[5])?,
            exchange: self.name.clone(),
        })
    }
}

#[async_trait]
impl CandleSource for BybitSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Ohlcv>> {
        let resp: BybitResponse = self
            .rest
            .get_json(
                "/v5/market/kline",
                &[
                    ("category", "spot".to_string()),
                    ("symbol", symbol.replace('/', "")),
                    ("interval", timeframe.to_bybit_interval().to_string()),
                    ("limit", limit.clamp(1, MAX_LIMIT).to_string()),
                ],
            )
            .await?;

        if resp.ret_code != 0 {
            return Err(classify_api_message(200, &resp.ret_msg));
        }

        let result = resp
            .result
            .ok_or_else(|| ExchangeError::Malformed("missing result".to_string()))?;

        let mut candles = result
            .list
            .iter()
            .map(|row| self.to_ohlcv(row))
            .collect::<ExchangeResult<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }
}
