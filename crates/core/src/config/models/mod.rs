pub mod app_config;
pub mod channel_log;
pub mod dispatcher_delivery;
pub mod ingress_observability;

pub use app_config::AppConfig;
pub use channel_log::{ChannelLogBackend, ChannelLogConfig, ContractConfig};
pub use dispatcher_delivery::{DeliveryConfig, DispatcherConfig};
pub use ingress_observability::{IngressConfig, ObservabilityConfig};
