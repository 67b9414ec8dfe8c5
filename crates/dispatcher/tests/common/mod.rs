#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use eventing_core::{
    config::DispatcherConfig,
    models::{CloudEvent, Contract},
    ChannelLog, IngressReceiver,
};
use eventing_dispatcher::{test_utils::mocks::MockDeliveryClient, ChannelDispatcher, ContractStore};
use eventing_infrastructure::{InMemoryChannelLog, MetricsCollector};
use url::Url;

pub struct Harness {
    pub log: Arc<InMemoryChannelLog>,
    pub store: Arc<ContractStore>,
    pub client: Arc<MockDeliveryClient>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(MockDeliveryClient::new())
    }

    pub fn with_client(client: MockDeliveryClient) -> Self {
        Self {
            log: Arc::new(InMemoryChannelLog::new()),
            store: Arc::new(ContractStore::new()),
            client: Arc::new(client),
        }
    }

    pub async fn channel(&self, name: &str, contract: Contract) {
        self.log.create_channel(name).await.unwrap();
        self.store.update(name, contract).await;
    }

    pub fn dispatcher(&self, channel: &str) -> ChannelDispatcher {
        ChannelDispatcher::new(
            channel,
            self.log.clone(),
            self.store.clone(),
            self.client.clone(),
            IngressReceiver::new(self.log.clone()),
            MetricsCollector::new(),
            test_config(),
        )
    }

    pub async fn wait_committed(&self, channel: &str, offset: u64) {
        for _ in 0..1000 {
            if self.log.committed_offset(channel).await.unwrap() >= offset {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("通道 {channel} 未能提交到偏移量 {offset}");
    }
}

pub fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        max_poll_records: 10,
        poll_timeout_ms: 100,
        poll_backoff_ms: 20,
        ..DispatcherConfig::default()
    }
}

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn event(id: &str) -> CloudEvent {
    CloudEvent::builder(id, "/producer", "com.example.created")
        .data_content_type("application/json")
        .data(format!(r#"{{"id":"{id}"}}"#))
        .build()
        .unwrap()
}
