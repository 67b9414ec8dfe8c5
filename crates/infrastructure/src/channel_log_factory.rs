use std::sync::Arc;
use tracing::{debug, info};

use eventing_core::{
    config::{ChannelLogBackend, ChannelLogConfig},
    ChannelLog, Result,
};

use crate::{InMemoryChannelLog, SqliteChannelLog};

pub struct ChannelLogFactory;

impl ChannelLogFactory {
    pub async fn create(config: &ChannelLogConfig) -> Result<Arc<dyn ChannelLog>> {
        debug!("Creating channel log with backend: {:?}", config.backend);

        match config.backend {
            ChannelLogBackend::Memory => {
                info!("Initializing in-memory channel log");
                Ok(Arc::new(InMemoryChannelLog::new()))
            }
            ChannelLogBackend::Sqlite => {
                info!("Initializing SQLite channel log");
                let log = SqliteChannelLog::connect(config).await?;
                Ok(Arc::new(log))
            }
        }
    }
}
