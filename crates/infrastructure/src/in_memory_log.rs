use async_trait::async_trait;
use eventing_core::{ChannelLog, CloudEvent, EventingError, LogRecord, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

/// 内存通道日志实现
///
/// 适用于嵌入式部署和测试场景，进程退出后数据丢失。
/// 读取方在没有新记录时挂起等待，追加时被唤醒。
#[derive(Default)]
pub struct InMemoryChannelLog {
    channels: RwLock<HashMap<String, ChannelState>>,
}

struct ChannelState {
    records: Vec<CloudEvent>,
    committed: u64,
    notify: Arc<Notify>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            committed: 0,
            notify: Arc::new(Notify::new()),
        }
    }
}

impl InMemoryChannelLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通道中的记录数量
    pub async fn record_count(&self, channel: &str) -> Result<usize> {
        let channels = self.channels.read().await;
        channels
            .get(channel)
            .map(|state| state.records.len())
            .ok_or_else(|| EventingError::channel_not_found(channel))
    }

    async fn notifier(&self, channel: &str) -> Result<Arc<Notify>> {
        let channels = self.channels.read().await;
        channels
            .get(channel)
            .map(|state| state.notify.clone())
            .ok_or_else(|| EventingError::channel_not_found(channel))
    }

    async fn collect(
        &self,
        channel: &str,
        from_offset: u64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>> {
        let channels = self.channels.read().await;
        let state = channels
            .get(channel)
            .ok_or_else(|| EventingError::channel_not_found(channel))?;

        Ok(state
            .records
            .iter()
            .enumerate()
            .skip(from_offset as usize)
            .take(max_records)
            .map(|(offset, event)| LogRecord {
                offset: offset as u64,
                event: event.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl ChannelLog for InMemoryChannelLog {
    async fn create_channel(&self, channel: &str) -> Result<()> {
        let mut channels = self.channels.write().await;
        if !channels.contains_key(channel) {
            channels.insert(channel.to_string(), ChannelState::new());
            info!("Created in-memory channel log: {}", channel);
        }
        Ok(())
    }

    async fn delete_channel(&self, channel: &str) -> Result<()> {
        let removed = self.channels.write().await.remove(channel);
        if let Some(state) = removed {
            // 唤醒挂起的读取方，让它们观察到通道已删除
            state.notify.notify_waiters();
            info!("Deleted in-memory channel log: {}", channel);
        }
        Ok(())
    }

    async fn channel_exists(&self, channel: &str) -> Result<bool> {
        Ok(self.channels.read().await.contains_key(channel))
    }

    async fn append(&self, channel: &str, event: &CloudEvent) -> Result<u64> {
        let mut channels = self.channels.write().await;
        let state = channels
            .get_mut(channel)
            .ok_or_else(|| EventingError::channel_not_found(channel))?;

        state.records.push(event.clone());
        let offset = state.records.len() as u64 - 1;
        state.notify.notify_waiters();

        debug!(channel = channel, offset = offset, "Appended event to in-memory log");
        Ok(offset)
    }

    async fn read(
        &self,
        channel: &str,
        from_offset: u64,
        max_records: usize,
        poll_timeout: Duration,
    ) -> Result<Vec<LogRecord>> {
        let deadline = tokio::time::Instant::now() + poll_timeout;

        loop {
            let notify = self.notifier(channel).await?;
            let notified = notify.notified();
            tokio::pin!(notified);
            // 先登记再检查，避免错过检查与等待之间的追加
            notified.as_mut().enable();

            let records = self.collect(channel, from_offset, max_records).await?;
            if !records.is_empty() {
                return Ok(records);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn committed_offset(&self, channel: &str) -> Result<u64> {
        let channels = self.channels.read().await;
        channels
            .get(channel)
            .map(|state| state.committed)
            .ok_or_else(|| EventingError::channel_not_found(channel))
    }

    async fn commit(&self, channel: &str, offset: u64) -> Result<()> {
        let mut channels = self.channels.write().await;
        let state = channels
            .get_mut(channel)
            .ok_or_else(|| EventingError::channel_not_found(channel))?;

        if offset > state.records.len() as u64 {
            return Err(EventingError::Storage(format!(
                "提交偏移量 {} 超出通道 {} 的日志末尾 {}",
                offset,
                channel,
                state.records.len()
            )));
        }
        state.committed = state.committed.max(offset);
        Ok(())
    }
}
