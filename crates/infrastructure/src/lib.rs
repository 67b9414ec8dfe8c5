pub mod channel_log_factory;
pub mod database;
pub mod in_memory_log;
pub mod observability;

pub use channel_log_factory::ChannelLogFactory;
pub use database::*;
pub use in_memory_log::InMemoryChannelLog;
pub use observability::*;
