//! 게이트웨이 데이터 계층.
//!
//! 프로세스 내 TTL + LRU 캐시(`CacheManager`)를 제공합니다.
//! 캐시는 수동적인 구조로, 만료 정리(`cleanup`)는 호출자가 주기적으로 실행합니다.

pub mod cache;
pub mod error;

pub use cache::{CacheHit, CacheManager, CacheStats};
pub use error::{DataError, Result};
