//! API 에러 응답.
//!
//! 모든 엔드포인트는 실패 시 같은 형식의 본문을 반환합니다.
//!
//! ```json
//! {
//!   "code": "INSUFFICIENT_SOURCES",
//!   "message": "Insufficient price sources for BTC/USDT: found 1, ...",
//!   "details": [{ "exchange": "bybit", "message": "Request timeout" }],
//!   "timestamp": 1738300800
//! }
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use gateway_core::GatewayError;

/// API 에러 응답 본문.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "CIRCUIT_OPEN", "INVALID_TIMEFRAME")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    pub timestamp: i64,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// 상태 코드가 붙은 API 에러.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
    retry_after: Option<Duration>,
}

impl ApiError {
    pub fn new(status: StatusCode, body: ApiErrorResponse) -> Self {
        Self {
            status,
            body,
            retry_after: None,
        }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiErrorResponse::new(code, message))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ApiErrorResponse {
        &self.body
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::InsufficientSources { .. }
            | GatewayError::AllSourcesFailed { .. }
            | GatewayError::CircuitOpen { .. }
            | GatewayError::LimiterClosed => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UnknownExchange(_) => StatusCode::NOT_FOUND,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = ApiErrorResponse::new(err.error_code(), err.to_string());
        let mut retry_after = None;

        match &err {
            GatewayError::CircuitOpen {
                exchange,
                retry_after: wait,
            } => {
                body = body.with_details(json!({
                    "exchange": exchange,
                    "retry_after_secs": wait.as_secs(),
                }));
                retry_after = Some(*wait);
            }
            other if !other.source_errors().is_empty() => {
                body = body.with_details(json!(other.source_errors()));
            }
            _ => {}
        }

        Self {
            status,
            body,
            retry_after,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(wait) = self.retry_after {
            // 남은 시간이 1초 미만이어도 최소 1초
            let secs = wait.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// API 핸들러 Result 타입.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::SourceError;

    #[test]
    fn test_status_mapping() {
        let insufficient = GatewayError::InsufficientSources {
            symbol: "BTC/USDT".to_string(),
            found: 1,
            errors: vec![SourceError::new("okx", "Request timeout")],
        };
        let err = ApiError::from(insufficient);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body().code, "INSUFFICIENT_SOURCES");
        assert_eq!(
            err.body().details,
            Some(json!([{ "exchange": "okx", "message": "Request timeout" }]))
        );

        let err = ApiError::from(GatewayError::UnknownExchange("kraken".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::from(GatewayError::Config("bad".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.body().details.is_none());
    }

    #[test]
    fn test_circuit_open_sets_retry_after() {
        let err = ApiError::from(GatewayError::CircuitOpen {
            exchange: "binance".to_string(),
            retry_after: Duration::from_secs(120),
        });
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "120"
        );
    }

    #[test]
    fn test_bad_request() {
        let err = ApiError::bad_request("INVALID_TIMEFRAME", "Invalid timeframe: 7x");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let json = serde_json::to_string(err.body()).unwrap();
        assert!(json.contains(r#""code":"INVALID_TIMEFRAME""#));
        assert!(!json.contains("details"));
    }
}
