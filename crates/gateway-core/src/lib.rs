//! # Gateway Core
//!
//! 거래소 게이트웨이 전반에서 공유되는 핵심 타입을 제공합니다.
//!
//! - 시장 데이터 타입 (`Ohlcv`, `PriceData`, `Timeframe`)
//! - 게이트웨이 에러 분류 (`GatewayError`)
//! - 계층형 설정 (`GatewayConfig`)
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
