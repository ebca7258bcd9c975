//! 配置管理
//!
//! 配置加载顺序：内置默认值 -> TOML配置文件 -> 环境变量（前缀 `DISPATCH_`，层级分隔符 `__`）。

pub mod models;


pub use models::*;
