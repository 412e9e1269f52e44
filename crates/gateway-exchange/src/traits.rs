//! 캔들 소스 trait 정의.

use async_trait::async_trait;
use gateway_core::{Ohlcv, Timeframe};
use rust_decimal::Decimal;

use crate::error::{ExchangeError, ExchangeResult};

/// 거래소 하나의 시장 데이터 조회 인터페이스.
///
/// 구현체는 실패를 반드시 `ExchangeError`로 분류해서 반환해야 합니다.
/// 호출 빈도 제한과 헬스 추적은 호출자 쪽에서 처리합니다.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 캔들 조회. 결과는 시간 오름차순입니다.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> ExchangeResult<Vec<Ohlcv>>;

    /// 최신 종가 조회.
    async fn fetch_latest_price(&self, symbol: &str, timeframe: Timeframe) -> ExchangeResult<Decimal> {
        let candles = self.fetch_candles(symbol, timeframe, 1).await?;
        candles
            .last()
            .map(|c| c.close)
            .ok_or_else(|| ExchangeError::Malformed(format!("no candles for {}", symbol)))
    }
}
