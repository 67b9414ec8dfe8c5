//! 配置管理
//!
//! `AppConfig` 由默认值、TOML配置文件和 `EVENTING__` 前缀的环境变量依次叠加而成，
//! 加载后逐段校验。

pub mod models;

pub use models::*;
