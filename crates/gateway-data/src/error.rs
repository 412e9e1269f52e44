//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 캐시 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 직렬화/역직렬화 오류
    #[error("Serialization error for key {key}: {message}")]
    Serialization { key: String, message: String },
}

/// 데이터 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, DataError>;
