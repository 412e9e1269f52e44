//! 다중 거래소 시장 데이터 집계.
//!
//! - `HealthTracker`: 거래소별 헬스 상태 머신 (일반 실패 / 지역 차단)
//! - `ExchangeAggregator`: 중앙값 가격 집계와 우선순위 캔들 폴백
//! - `LiquidityMonitor` / `SecurityValidator`: 집계 결과 위의 점수 계산
//! - `Gateway`: 설정에서 전체를 조립하는 구성 루트

pub mod aggregator;
pub mod gateway;
pub mod health;
pub mod liquidity;
pub mod pricing;
pub mod security;

pub use aggregator::{AggregatorSettings, ExchangeAggregator, ExchangeEntry, ExchangeStatus};
pub use gateway::Gateway;
pub use health::{HealthPolicy, HealthSnapshot, HealthState, HealthTracker, UnhealthyReason};
pub use liquidity::{score_liquidity, LiquidityBreakdown, LiquidityMonitor, LiquidityReport};
pub use security::{assess_security, RiskLevel, SecurityCheck, SecurityReport, SecurityValidator};
