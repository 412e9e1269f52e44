//! 시장 데이터 endpoint.
//!
//! 경로의 심볼은 `BTC-USDT` 형식이며 내부적으로 `BTC/USDT`로 정규화됩니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/price/{symbol}` - 다중 거래소 집계 가격
//! - `GET /api/v1/ohlcv/{symbol}?timeframe=1h&limit=100` - 캔들
//! - `GET /api/v1/frames/{symbol}?timeframes=1m,1h&limit=100` - 여러 타임프레임 캔들
//! - `GET /api/v1/liquidity/{symbol}` - 유동성 점수
//! - `GET /api/v1/security/{symbol}` - 위험 점수

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use gateway_core::{normalize_symbol, MarketFrames, Ohlcv, PriceData, Timeframe};
use gateway_market::{LiquidityReport, SecurityReport};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// 캔들 조회 기본 개수.
const DEFAULT_LIMIT: usize = 100;

/// 캔들 조회 최대 개수.
const MAX_LIMIT: usize = 1000;

const DEFAULT_FRAMES: &str = "1h,4h,1d";

#[derive(Debug, Deserialize)]
pub struct OhlcvQuery {
    pub timeframe: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FramesQuery {
    /// 쉼표로 구분된 타임프레임 목록
    pub timeframes: Option<String>,
    pub limit: Option<usize>,
}

fn parse_timeframe(raw: &str) -> ApiResult<Timeframe> {
    raw.trim()
        .parse::<Timeframe>()
        .map_err(|e| ApiError::bad_request("INVALID_TIMEFRAME", e))
}

fn parse_limit(limit: Option<usize>) -> ApiResult<usize> {
    match limit.unwrap_or(DEFAULT_LIMIT) {
        0 => Err(ApiError::bad_request("INVALID_LIMIT", "limit must be at least 1")),
        n => Ok(n.min(MAX_LIMIT)),
    }
}

/// GET /api/v1/price/{symbol}
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<PriceData>> {
    let symbol = normalize_symbol(&symbol);
    let price = state.gateway.aggregator().get_aggregated_price(&symbol).await?;
    Ok(Json(price))
}

/// GET /api/v1/ohlcv/{symbol}
pub async fn get_ohlcv(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<OhlcvQuery>,
) -> ApiResult<Json<Vec<Ohlcv>>> {
    let symbol = normalize_symbol(&symbol);
    let timeframe = match query.timeframe.as_deref() {
        Some(raw) => parse_timeframe(raw)?,
        None => Timeframe::H1,
    };
    let limit = parse_limit(query.limit)?;

    let candles = state
        .gateway
        .aggregator()
        .get_ohlcv(&symbol, timeframe, limit)
        .await?;
    Ok(Json(candles))
}

/// GET /api/v1/frames/{symbol}
pub async fn get_frames(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<FramesQuery>,
) -> ApiResult<Json<MarketFrames>> {
    let symbol = normalize_symbol(&symbol);
    let mut timeframes = query
        .timeframes
        .as_deref()
        .unwrap_or(DEFAULT_FRAMES)
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_timeframe)
        .collect::<ApiResult<Vec<_>>>()?;
    timeframes.sort();
    timeframes.dedup();
    if timeframes.is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_TIMEFRAME",
            "at least one timeframe is required",
        ));
    }
    let limit = parse_limit(query.limit)?;

    let frames = state
        .gateway
        .aggregator()
        .get_market_frames(&symbol, &timeframes, limit)
        .await?;
    Ok(Json(frames))
}

/// GET /api/v1/liquidity/{symbol}
pub async fn get_liquidity(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<LiquidityReport>> {
    let symbol = normalize_symbol(&symbol);
    let report = state.gateway.liquidity().analyze(&symbol).await?;
    Ok(Json(report))
}

/// GET /api/v1/security/{symbol}
pub async fn get_security(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<SecurityReport>> {
    let symbol = normalize_symbol(&symbol);
    let report = state.gateway.security().validate(&symbol).await?;
    Ok(Json(report))
}

pub fn market_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/price/{symbol}", get(get_price))
        .route("/ohlcv/{symbol}", get(get_ohlcv))
        .route("/frames/{symbol}", get(get_frames))
        .route("/liquidity/{symbol}", get(get_liquidity))
        .route("/security/{symbol}", get(get_security))
}
