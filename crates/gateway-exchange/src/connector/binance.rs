//! Binance 현물 캔들 소스.
//!
//! `GET /api/v3/klines` 공개 엔드포인트를 사용합니다.

use async_trait::async_trait;
use gateway_core::{Ohlcv, Timeframe};
use serde::Deserialize;
use std::time::Duration;

use super::http::{parse_decimal, parse_timestamp_ms, RestClient};
use crate::error::ExchangeResult;
use crate::traits::CandleSource;

/// Binance REST 기본 URL.
pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Binance 요청당 최대 캔들 수.
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Deserialize)]
struct BinanceKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

/// Binance 캔들 소스.
pub struct BinanceSource {
    name: String,
    rest: RestClient,
}

impl BinanceSource {
    /// 새 소스 생성. `base_url`이 없으면 운영 엔드포인트를 사용합니다.
    pub fn new(
        name: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> ExchangeResult<Self> {
        Ok(Self {
            name: name.into(),
            rest: RestClient::new(base_url.unwrap_or(BINANCE_BASE_URL), timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        self.rest.base_url()
    }

    /// "BTC/USDT" -> "BTCUSDT"
    fn to_market_symbol(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    fn to_ohlcv(&self, k: BinanceKline) -> ExchangeResult<Ohlcv> {
        Ok(Ohlcv {
            timestamp: parse_timestamp_ms(k.0)?,
            open: parse_decimal("open", &k.1)?,
            high: parse_decimal("high", &k.2)?,
            low: parse_decimal("low", &k.3)?,
            close: parse_decimal("close", &k.4)?,
            volume: parse_decimal("volume", &k.5)?,
            exchange: self.name.clone(),
        })
    }
}

#[async_trait]
impl CandleSource for BinanceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Ohlcv>> {
        let resp: Vec<BinanceKline> = self
            .rest
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", Self::to_market_symbol(symbol)),
                    ("interval", timeframe.to_binance_interval().to_string()),
                    ("limit", limit.clamp(1, MAX_LIMIT).to_string()),
                ],
            )
            .await?;

        // Binance는 오래된 순서로 반환
        resp.into_iter().map(|k| self.to_ohlcv(k)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use rust_decimal_macros::dec;

    fn source(server: &mockito::Server) -> BinanceSource {
        BinanceSource::new("binance", Some(&server.url()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_candles() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                mockito::Matcher::UrlEncoded("interval".into(), "1h".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                  [1700000000000,"100.0","110.0","95.0","105.0","12.5",1700003599999,"1300.0",42,"6.0","630.0","0"],
                  [1700003600000,"105.0","106.0","104.0","105.5","3.0",1700007199999,"316.5",10,"1.0","105.0","0"]
                ]"#,
            )
            .create_async()
            .await;

        let candles = source(&server)
            .fetch_candles("BTC/USDT", Timeframe::H1, 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, dec!(105.0));
        assert_eq!(candles[1].volume, dec!(3.0));
        assert_eq!(candles[0].exchange, "binance");
        assert!(candles[0].timestamp < candles[1].timestamp);
    }

    #[tokio::test]
    async fn test_restricted_location_is_geo() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(451)
            .with_body(
                r#"{"code":0,"msg":"Service unavailable from a restricted location according to 'b. Eligibility'"}"#,
            )
            .create_async()
            .await;

        let err = source(&server)
            .fetch_candles("BTC/USDT", Timeframe::M1, 1)
            .await
            .unwrap_err();
        assert!(err.is_geo_restricted());
    }

    #[tokio::test]
    async fn test_bad_number_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"[[1700000000000,"abc","1","1","1","1",1,"1",1,"1","1","0"]]"#)
            .create_async()
            .await;

        let err = source(&server)
            .fetch_candles("BTC/USDT", Timeframe::M1, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Malformed(_)));
    }
}
