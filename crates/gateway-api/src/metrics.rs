//! Prometheus 메트릭 설정과 HTTP 메트릭 미들웨어.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// 지연 시간 히스토그램 버킷 (초).
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Rate limit 대기 히스토그램 버킷 (초).
const WAIT_BUCKETS: &[f64] = &[0.0, 0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("gateway_upstream_latency_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("gateway_rate_limit_wait_seconds".to_string()),
            WAIT_BUCKETS,
        )
}

/// 전역 레코더를 설치하고 `/metrics` 렌더링용 핸들을 반환합니다.
///
/// 레코더는 프로세스당 한 번만 설치할 수 있습니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// 전역 설치 없이 핸들만 생성합니다. 라우터 테스트용입니다.
pub fn detached_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    Ok(builder()?.build_recorder().handle())
}

/// HTTP 요청 수와 처리 시간을 기록하는 미들웨어.
///
/// 경로 라벨은 매칭된 라우트 패턴(`/api/v1/price/{symbol}`)을 사용해
/// 심볼마다 시계열이 늘어나지 않게 합니다.
pub async fn metrics_layer(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_handle_renders() {
        let handle = detached_metrics_handle().unwrap();
        // 전역 레코더가 아니므로 요청 메트릭이 기록되지 않음
        assert!(!handle.render().contains("http_requests_total"));
    }
}
