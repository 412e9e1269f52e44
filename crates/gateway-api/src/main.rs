//! 거래소 게이트웨이 API 서버.
//!
//! 설정 로드 → 로깅 → 메트릭 → 게이트웨이 조립 → 유지보수 태스크 → HTTP 서버 순으로 시작합니다.
//! 설정 파일 경로는 `GATEWAY_CONFIG` 환경 변수로 바꿀 수 있습니다 (기본: `config/default.toml`).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gateway_api::metrics::setup_metrics_recorder;
use gateway_api::{create_router, AppState};
use gateway_core::{init_logging, GatewayConfig, LogConfig};
use gateway_market::Gateway;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config_path =
        std::env::var("GATEWAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = GatewayConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;
    info!(config = %config_path, "Starting exchange gateway...");

    let metrics_handle =
        setup_metrics_recorder().context("failed to install Prometheus recorder")?;
    info!("Prometheus metrics recorder initialized");

    let addr = config.server.socket_addr().map_err(|e| {
        error!(
            host = %config.server.host,
            port = config.server.port,
            error = %e,
            "Invalid server address, check GATEWAY__SERVER__HOST and GATEWAY__SERVER__PORT"
        );
        e
    })?;
    let request_timeout = config.server.request_timeout();

    let gateway = Gateway::from_config(config).context("failed to assemble gateway")?;
    info!(
        exchanges = ?gateway.aggregator().exchange_names(),
        "Gateway assembled"
    );

    let shutdown_token = CancellationToken::new();
    let maintenance = gateway.spawn_maintenance(shutdown_token.clone());

    let state = Arc::new(AppState::new(gateway));
    let app = create_router(state, metrics_handle, request_timeout);

    info!(%addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    if tokio::time::timeout(Duration::from_secs(5), maintenance)
        .await
        .is_err()
    {
        warn!("Maintenance task did not stop in time");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Ctrl+C 또는 SIGTERM을 기다린 뒤 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
