//! 거래소 공개 REST API 공용 클라이언트.

use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::classify::classify_http_failure;
use crate::error::{ExchangeError, ExchangeResult};

/// 공개 엔드포인트 전용 HTTP 클라이언트.
#[derive(Debug, Clone)]
pub(crate) struct RestClient {
    base_url: String,
    client: Client,
}

impl RestClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::Network`를 반환합니다.
    pub(crate) fn new(base_url: impl Into<String>, timeout: Duration) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 공개 API GET 요청.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(url = %url, ?params, "GET");

        let response = self.client.get(&url).query(params).send().await?;
        Self::handle_response(response).await
    }

    /// 응답 처리. 실패 응답은 경계에서 분류합니다.
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify_http_failure(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            debug!(error = %e, body = %body, "Failed to parse response");
            ExchangeError::Malformed(e.to_string())
        })
    }
}

/// 문자열에서 Decimal 파싱.
pub(crate) fn parse_decimal(field: &str, s: &str) -> ExchangeResult<Decimal> {
    s.parse()
        .map_err(|_| ExchangeError::Malformed(format!("invalid {}: {:?}", field, s)))
}

/// 밀리초 타임스탬프 파싱.
pub(crate) fn parse_timestamp_ms(ms: i64) -> ExchangeResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ExchangeError::Malformed(format!("invalid timestamp: {}", ms)))
}
