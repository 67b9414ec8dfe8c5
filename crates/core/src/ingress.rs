use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::codec::{self, WireMessage};
use crate::models::CloudEvent;
use crate::traits::ChannelLog;
use crate::Result;

/// 入口接收结果：事件已持久化追加到通道日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub channel: String,
    pub event_id: String,
    pub offset: u64,
}

/// 入口接收器
///
/// 解码线上消息并追加到目标通道日志，只有追加成功后才返回。
/// 回复链路会把订阅者的回复事件再次交给同一个接收器。
#[derive(Clone)]
pub struct IngressReceiver {
    log: Arc<dyn ChannelLog>,
}

impl IngressReceiver {
    pub fn new(log: Arc<dyn ChannelLog>) -> Self {
        Self { log }
    }

    #[instrument(skip(self, message), fields(channel = %channel))]
    pub async fn receive(&self, channel: &str, message: &WireMessage) -> Result<Accepted> {
        let event = codec::decode(message).inspect_err(|e| {
            warn!("拒绝无效事件: {e}");
        })?;
        self.accept(channel, event).await
    }

    /// 接收已解码的事件
    pub async fn accept(&self, channel: &str, event: CloudEvent) -> Result<Accepted> {
        let offset = self.log.append(channel, &event).await?;

        debug!(
            channel = channel,
            event_id = event.id(),
            offset = offset,
            "事件已追加到通道日志"
        );

        Ok(Accepted {
            channel: channel.to_string(),
            event_id: event.id().to_string(),
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::models::ContentMode;
    use crate::traits::LogRecord;
    use crate::EventingError;

    #[derive(Default)]
    struct MockChannelLog {
        channels: Mutex<HashMap<String, Vec<CloudEvent>>>,
    }

    #[async_trait]
    impl ChannelLog for MockChannelLog {
        async fn create_channel(&self, channel: &str) -> Result<()> {
            self.channels
                .lock()
                .await
                .entry(channel.to_string())
                .or_default();
            Ok(())
        }

        async fn delete_channel(&self, channel: &str) -> Result<()> {
            self.channels.lock().await.remove(channel);
            Ok(())
        }

        async fn channel_exists(&self, channel: &str) -> Result<bool> {
            Ok(self.channels.lock().await.contains_key(channel))
        }

        async fn append(&self, channel: &str, event: &CloudEvent) -> Result<u64> {
            let mut channels = self.channels.lock().await;
            let log = channels
                .get_mut(channel)
                .ok_or_else(|| EventingError::channel_not_found(channel))?;
            log.push(event.clone());
            Ok(log.len() as u64 - 1)
        }

        async fn read(
            &self,
            _channel: &str,
            _from_offset: u64,
            _max_records: usize,
            _poll_timeout: Duration,
        ) -> Result<Vec<LogRecord>> {
            Ok(vec![])
        }

        async fn committed_offset(&self, _channel: &str) -> Result<u64> {
            Ok(0)
        }

        async fn commit(&self, _channel: &str, _offset: u64) -> Result<()> {
            Ok(())
        }
    }

    fn sample_event(id: &str) -> CloudEvent {
        CloudEvent::builder(id, "/test", "test.event")
            .data_content_type("text/plain")
            .data("hello")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_receive_appends_in_order() {
        let log = Arc::new(MockChannelLog::default());
        log.create_channel("orders").await.unwrap();
        let receiver = IngressReceiver::new(log.clone());

        for (i, mode) in [ContentMode::Binary, ContentMode::Structured].iter().enumerate() {
            let wire = codec::encode(&sample_event(&i.to_string()), *mode).unwrap();
            let accepted = receiver.receive("orders", &wire).await.unwrap();
            assert_eq!(accepted.offset, i as u64);
            assert_eq!(accepted.event_id, i.to_string());
        }

        let channels = log.channels.lock().await;
        assert_eq!(channels["orders"].len(), 2);
        assert_eq!(channels["orders"][1], sample_event("1"));
    }

    #[tokio::test]
    async fn test_receive_rejects_malformed() {
        let log = Arc::new(MockChannelLog::default());
        log.create_channel("orders").await.unwrap();
        let receiver = IngressReceiver::new(log.clone());

        let wire = WireMessage::new()
            .with_header("ce-specversion", "1.0")
            .with_header("ce-id", "1");
        let result = receiver.receive("orders", &wire).await;

        assert!(matches!(result, Err(EventingError::MalformedEvent(_))));
        assert!(log.channels.lock().await["orders"].is_empty());
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let receiver = IngressReceiver::new(Arc::new(MockChannelLog::default()));
        let result = receiver.accept("missing", sample_event("1")).await;
        assert!(matches!(result, Err(EventingError::ChannelNotFound { .. })));
    }
}
