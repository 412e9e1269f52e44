//! 거래소 게이트웨이 HTTP API.
//!
//! axum 라우터, 에러 응답 매핑, Prometheus 메트릭을 제공합니다.
//! 실행 파일은 `src/main.rs`에 있습니다.

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::create_router;
pub use state::AppState;
