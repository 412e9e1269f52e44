//! 캐시/rate limit 상태와 캐시 관리 endpoint.
//!
//! - `GET /metrics/cache` - 캐시 통계
//! - `GET /metrics/rate-limit` - 거래소별 rate limit 통계
//! - `POST /cache/clear` - 전체 삭제
//! - `POST /cache/invalidate` - 패턴(부분 문자열) 매칭 삭제

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use gateway_data::CacheStats;
use gateway_exchange::RateLimitStats;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /metrics/cache
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.gateway.cache().stats())
}

/// GET /metrics/rate-limit
pub async fn rate_limit_stats(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, RateLimitStats>> {
    let stats = state
        .gateway
        .limiter()
        .stats_all()
        .into_iter()
        .map(|s| (s.exchange.clone(), s))
        .collect();
    Json(stats)
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// POST /cache/clear
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    let cleared = state.gateway.cache().clear();
    info!(cleared, "Cache cleared via API");
    Json(ClearResponse { cleared })
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    pub pattern: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    pub removed: usize,
}

/// POST /cache/invalidate
pub async fn invalidate_cache(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<Json<InvalidateResponse>> {
    if request.pattern.is_empty() {
        return Err(ApiError::bad_request(
            "INVALID_PATTERN",
            "pattern must not be empty, use /cache/clear to remove everything",
        ));
    }

    let removed = state.gateway.cache().invalidate_pattern(&request.pattern);
    info!(pattern = %request.pattern, removed, "Cache entries invalidated via API");
    Ok(Json(InvalidateResponse {
        pattern: request.pattern,
        removed,
    }))
}

pub fn cache_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/metrics/cache", get(cache_stats))
        .route("/metrics/rate-limit", get(rate_limit_stats))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/invalidate", post(invalidate_cache))
}
