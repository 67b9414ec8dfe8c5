//! 数据面核心库：CloudEvent模型、编解码、订阅契约、通道日志抽象以及入口接收器。

pub mod codec;
pub mod config;
pub mod errors;
pub mod ingress;
pub mod models;
pub mod traits;

pub use codec::WireMessage;
pub use config::AppConfig;
pub use errors::*;
pub use ingress::{Accepted, IngressReceiver};
pub use models::{
    BackoffPolicy, CloudEvent, CloudEventBuilder, ContentMode, Contract, DeliverySpec,
    Destination, Subscription,
};
pub use traits::{ChannelLog, LogRecord};
