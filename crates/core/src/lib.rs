pub mod config;
pub mod errors;

pub use errors::{DispatchError, ErrorKind};

/// 全局统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
