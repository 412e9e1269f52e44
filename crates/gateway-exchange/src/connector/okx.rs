//! OKX 현물 캔들 소스.

use async_trait::async_trait;
use gateway_core::{Ohlcv, Timeframe};
use serde::Deserialize;
use std::time::Duration;

use super::http::{parse_decimal, parse_timestamp_ms, RestClient};
use crate::classify::classify_api_message;
use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::CandleSource;

/// OKX REST 기본 URL.
pub const OKX_BASE_URL: &str = "https://www.okx.com";

const MAX_LIMIT: usize = 300;

#[derive(Debug, Deserialize)]
struct OkxResponse {
    code: String,
    #[serde(default)]
    msg: String,
    /// [ts, o, h, l, c, vol, volCcy, volCcyQuote, confirm], 최신 순
    #[serde(default)]
    data: Vec<Vec<String>>,
}

/// OKX 캔들 소스.
pub struct OkxSource {
    name: String,
    rest: RestClient,
}

impl OkxSource {
    pub fn new(
        name: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> ExchangeResult<Self> {
        Ok(Self {
            name: name.into(),
            rest: RestClient::new(base_url.unwrap_or(OKX_BASE_URL), timeout)?,
        })
    }

    /// "BTC/USDT" -> "BTC-USDT"
    fn to_inst_id(symbol: &str) -> String {
        symbol.replace('/', "-")
    }

    fn to_ohlcv(&self, row: &[String]) -> ExchangeResult<Ohlcv> {
        if row.len() < 6 {
            return Err(ExchangeError::Malformed(format!(
                "candle row has {} fields",
                row.len()
            )));
        }
        let ts: i64 = row[0]
            .parse()
            .map_err(|_| ExchangeError::Malformed(format!("invalid ts: {:?}", row[0])))?;
        Ok(Ohlcv {
            timestamp: parse_timestamp_ms(ts)?,
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
impl CandleSource for OkxSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Ohlcv>> {
        let resp: OkxResponse = self
            .rest
            .get_json(
                "/api/v5/market/candles",
                &[
                    ("instId", Self::to_inst_id(symbol)),
                    ("bar", timeframe.to_okx_bar().to_string()),
                    ("limit", limit.clamp(1, MAX_LIMIT).to_string()),
                ],
            )
            .await?;

        if resp.code != "0" {
            return Err(classify_api_message(200, &resp.msg));
        }

        let mut candles = resp
            .data
            .iter()
            .map(|row| self.to_ohlcv(row))
            .collect::<ExchangeResult<Vec<_>>>()?;
        candles.reverse();
        Ok(candles)
    }
}
