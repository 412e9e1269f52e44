//! 게이트웨이 공용 타입.

pub mod market;
pub mod symbol;
pub mod timeframe;

pub use market::*;
pub use symbol::*;
pub use timeframe::*;
