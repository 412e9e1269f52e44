//! 거래소 에러 타입.
//!
//! 업스트림 실패는 경계(커넥터)에서 이 닫힌 분류로 변환된 뒤
//! 헬스 추적 코드로 전달됩니다.

use thiserror::Error;

/// 거래소 호출 실패.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// 요청 타임아웃
    #[error("Request timeout")]
    Timeout,

    /// HTTP 에러 응답
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// 배포 지역이 거래소에서 차단됨
    #[error("Geo-restricted (HTTP {status}): {message}")]
    GeoRestricted { status: u16, message: String },

    /// 응답 형식 오류
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// HTTP 상태 없는 연결 수준 실패
    #[error("Network error: {0}")]
    Network(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// 지역 제한 실패인지 확인.
    pub fn is_geo_restricted(&self) -> bool {
        matches!(self, ExchangeError::GeoRestricted { .. })
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Timeout | ExchangeError::Network(_) => true,
            ExchangeError::Http { status, .. } => *status == 429 || *status >= 500,
            ExchangeError::GeoRestricted { .. } | ExchangeError::Malformed(_) => false,
        }
    }

    /// 메트릭 레이블용 분류 이름.
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeError::Timeout => "timeout",
            ExchangeError::Http { .. } => "http",
            ExchangeError::GeoRestricted { .. } => "geo_restricted",
            ExchangeError::Malformed(_) => "malformed",
            ExchangeError::Network(_) => "network",
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout
        } else if err.is_decode() {
            ExchangeError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            crate::classify::classify_http_failure(status.as_u16(), &err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ExchangeError::Timeout.is_retryable());
        assert!(ExchangeError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(ExchangeError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(!ExchangeError::Http { status: 400, message: String::new() }.is_retryable());
        assert!(!ExchangeError::Malformed("bad".into()).is_retryable());
    }

    #[test]
    fn test_serde_error_is_malformed() {
        let err: ExchangeError = serde_json::from_str::<Vec<u8>>("{").unwrap_err().into();
        assert_eq!(err.kind(), "malformed");
    }
}
