//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크
//! - `/exchanges/{name}/reset` - 거래소 헬스 리셋
//! - `/metrics/cache`, `/metrics/rate-limit` - 내부 상태
//! - `/cache/clear`, `/cache/invalidate` - 캐시 관리
//! - `/api/v1/*` - 시장 데이터
//! - `/metrics` - Prometheus

pub mod cache;
pub mod health;
pub mod market;

pub use cache::cache_router;
pub use health::{health_router, HealthResponse};
pub use market::market_router;

use axum::{extract::State, http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_layer;
use crate::state::AppState;

/// 상태가 연결되지 않은 API 라우터.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health_router())
        .merge(cache_router())
        .nest("/api/v1", market_router())
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// 전체 라우터 생성 (미들웨어 포함).
pub fn create_router(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    request_timeout: Duration,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
}
