//! 게이트웨이 에러 타입.
//!
//! 개별 거래소 호출 실패는 집계기 내부에서 흡수되고,
//! 사용 가능한 모든 소스가 소진되었을 때만 이 타입으로 호출자에게 전달됩니다.

use std::time::Duration;
use thiserror::Error;

use crate::types::SourceError;

/// 게이트웨이 에러.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// 가격 합성에 필요한 관측값 부족
    #[error("Insufficient price sources for {symbol}: found {found}, errors: {}", join_errors(.errors))]
    InsufficientSources {
        symbol: String,
        found: usize,
        errors: Vec<SourceError>,
    },

    /// OHLCV 폴백 소진
    #[error("All exchanges failed for {symbol}: {}", join_errors(.errors))]
    AllSourcesFailed {
        symbol: String,
        errors: Vec<SourceError>,
    },

    /// 서킷 브레이커 열림
    #[error("Circuit breaker open for {exchange}, retry after {retry_after:?}")]
    CircuitOpen {
        exchange: String,
        retry_after: Duration,
    },

    /// 초기화되지 않은 거래소
    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiter가 종료되어 요청을 처리할 수 없음
    #[error("Rate limiter is shut down")]
    LimiterClosed,
}

/// 게이트웨이 작업을 위한 Result 타입.
pub type GatewayResult<T> = Result<T, GatewayError>;

fn join_errors(errors: &[SourceError]) -> String {
    if errors.is_empty() {
        return "none".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl GatewayError {
    /// 잠시 후 재시도하면 성공할 수 있는 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::InsufficientSources { .. }
                | GatewayError::AllSourcesFailed { .. }
                | GatewayError::CircuitOpen { .. }
        )
    }

    /// API 응답용 에러 코드.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::InsufficientSources { .. } => "INSUFFICIENT_SOURCES",
            GatewayError::AllSourcesFailed { .. } => "ALL_SOURCES_FAILED",
            GatewayError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            GatewayError::UnknownExchange(_) => "UNKNOWN_EXCHANGE",
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::LimiterClosed => "LIMITER_CLOSED",
        }
    }

    /// 에러에 포함된 거래소별 실패 목록.
    pub fn source_errors(&self) -> &[SourceError] {
        match self {
            GatewayError::InsufficientSources { errors, .. }
            | GatewayError::AllSourcesFailed { errors, .. } => errors,
            _ => &[],
        }
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}
