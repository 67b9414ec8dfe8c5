pub mod channel_log;

pub use channel_log::*;
