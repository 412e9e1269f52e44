//! 헬스 체크와 거래소 관리 endpoint.
//!
//! - `GET /health` - 전체 상태와 거래소별 헬스/circuit breaker
//! - `POST /exchanges/{name}/reset` - 거래소 헬스 수동 리셋

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use gateway_data::CacheStats;
use gateway_market::ExchangeStatus;

use crate::error::ApiResult;
use crate::state::AppState;

/// 헬스 체크 응답.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 전체 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: String,
    /// 라우팅 가능한 거래소 수
    pub healthy_exchanges: usize,
    pub exchanges: Vec<ExchangeStatus>,
    pub cache: CacheStats,
}

/// 라우팅 가능한 거래소 수로 전체 상태를 결정합니다.
pub fn overall_status(healthy_exchanges: usize) -> &'static str {
    match healthy_exchanges {
        0 => "unhealthy",
        1 => "degraded",
        _ => "healthy",
    }
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.gateway.aggregator();
    let exchanges = aggregator.get_health_status();
    let healthy_exchanges = exchanges
        .iter()
        .filter(|e| e.health.healthy && e.rate_limit.as_ref().map_or(true, |r| r.healthy))
        .count();
    let status = overall_status(healthy_exchanges);

    let code = if healthy_exchanges == 0 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: state.version.clone(),
            uptime_secs: state.uptime_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            healthy_exchanges,
            exchanges,
            cache: state.gateway.cache().stats(),
        }),
    )
}

/// 리셋 응답.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub exchange: String,
    pub reset: bool,
}

/// POST /exchanges/{name}/reset
pub async fn reset_exchange(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<ResetResponse>> {
    state.gateway.aggregator().reset_exchange_health(&name)?;
    info!(exchange = %name, "Exchange reset via API");
    Ok(Json(ResetResponse {
        exchange: name,
        reset: true,
    }))
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/exchanges/{name}/reset", post(reset_exchange))
}
