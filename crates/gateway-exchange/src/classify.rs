//! 업스트림 실패 분류.
//!
//! 지역 차단은 상태 코드(403/451)나 거래소/CDN이 돌려주는 문구로만 식별됩니다.

use crate::error::ExchangeError;

/// 지역 차단 응답에 나타나는 문구 (소문자).
const GEO_PATTERNS: [&str; 7] = [
    "restricted location",
    "not available in your region",
    "unavailable in your country",
    "service unavailable from a restricted",
    "geo-restricted",
    "eligibility",
    "cloudfront",
];

/// 상태 코드와 메시지로 지역 차단 여부를 판단합니다.
pub fn is_geo_restriction(status: Option<u16>, message: &str) -> bool {
    if matches!(status, Some(403) | Some(451)) {
        return true;
    }
    let lower = message.to_lowercase();
    GEO_PATTERNS.iter().any(|p| lower.contains(p))
}

/// HTTP 에러 응답을 `ExchangeError`로 변환합니다.
pub fn classify_http_failure(status: u16, body: &str) -> ExchangeError {
    let message = truncate(body, 200);
    if is_geo_restriction(Some(status), body) {
        ExchangeError::GeoRestricted { status, message }
    } else {
        ExchangeError::Http { status, message }
    }
}

/// 거래소가 200과 함께 돌려준 API 에러 메시지를 분류합니다.
pub fn classify_api_message(status: u16, message: &str) -> ExchangeError {
    if is_geo_restriction(None, message) {
        ExchangeError::GeoRestricted {
            status,
            message: truncate(message, 200),
        }
    } else {
        ExchangeError::Malformed(truncate(message, 200))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_by_status() {
        assert!(is_geo_restriction(Some(451), ""));
        assert!(is_geo_restriction(Some(403), "Forbidden"));
        assert!(!is_geo_restriction(Some(500), "Internal error"));
    }

    #[test]
    fn test_geo_by_message() {
        assert!(is_geo_restriction(
            None,
            "Service unavailable from a restricted location according to 'b. Eligibility'"
        ));
        assert!(is_geo_restriction(Some(200), "This service is NOT available in your region"));
        assert!(is_geo_restriction(None, "The request could not be satisfied. CloudFront"));
        assert!(!is_geo_restriction(None, "Invalid symbol"));
    }

    #[test]
    fn test_classify_http_failure() {
        assert!(matches!(
            classify_http_failure(451, "blocked"),
            ExchangeError::GeoRestricted { status: 451, .. }
        ));
        assert!(matches!(
            classify_http_failure(502, "Bad gateway"),
            ExchangeError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(500);
        match classify_http_failure(500, &body) {
            ExchangeError::Http { message, .. } => assert_eq!(message.len(), 203),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
