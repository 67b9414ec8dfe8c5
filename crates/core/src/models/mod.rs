//! # 数据模型
//!
//! 数据面的核心数据结构：CloudEvent事件、订阅契约以及投递配置。
//!
//! ## 核心模型
//!
//! ### CloudEvent - 事件
//! 不可变的CloudEvents 1.0事件，由入口创建，之后只会被复制（回复链路）而不会被修改。
//!
//! ### Contract / Subscription - 订阅契约
//! 一个通道当前生效的订阅集合。契约整体替换，调度器对每个事件只读取一次快照。
//!
//! ### DeliverySpec - 投递配置
//! 重试次数、退避策略、请求超时等投递参数。

pub mod contract;
pub mod event;
pub mod iso_duration;

pub use contract::*;
pub use event::*;
