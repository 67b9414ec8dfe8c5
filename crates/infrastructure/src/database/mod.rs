pub mod sqlite_channel_log;

pub use sqlite_channel_log::SqliteChannelLog;
