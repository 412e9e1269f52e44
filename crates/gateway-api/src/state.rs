//! 애플리케이션 상태.

use std::time::Instant;

use gateway_market::Gateway;

/// 핸들러 간 공유 상태.
pub struct AppState {
    pub gateway: Gateway,
    /// API 버전
    pub version: String,
    started_at: Instant,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// 서버 업타임 (초).
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
