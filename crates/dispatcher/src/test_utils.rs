//! 测试辅助：可编排结果的投递客户端

pub mod mocks {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;
    use url::Url;

    use eventing_core::models::{CloudEvent, ContentMode};

    use crate::delivery_client::{DeliveryClient, DeliveryOutcome};

    /// 一次被记录下来的投递尝试
    #[derive(Debug, Clone)]
    pub struct RecordedAttempt {
        pub event: CloudEvent,
        pub target: Url,
        pub mode: ContentMode,
        pub at: Instant,
    }

    #[derive(Default)]
    struct Script {
        queued: VecDeque<DeliveryOutcome>,
        fallback: Option<DeliveryOutcome>,
    }

    /// 按目标地址编排结果的投递客户端
    ///
    /// 先消费排队的结果，再使用该地址的默认结果；未编排的地址返回 `Delivered`。
    #[derive(Default)]
    pub struct MockDeliveryClient {
        scripts: Mutex<HashMap<String, Script>>,
        attempts: Mutex<Vec<RecordedAttempt>>,
        latency: Option<Duration>,
    }

    impl MockDeliveryClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// 每次尝试前等待的时长，用于模拟进行中的请求
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        pub fn always(&self, target: &str, outcome: DeliveryOutcome) {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.entry(target.to_string()).or_default().fallback = Some(outcome);
        }

        pub fn enqueue(&self, target: &str, outcome: DeliveryOutcome) {
            let mut scripts = self.scripts.lock().unwrap();
            scripts
                .entry(target.to_string())
                .or_default()
                .queued
                .push_back(outcome);
        }

        pub fn attempts(&self) -> Vec<RecordedAttempt> {
            self.attempts.lock().unwrap().clone()
        }

        pub fn attempts_to(&self, target: &str) -> Vec<RecordedAttempt> {
            self.attempts()
                .into_iter()
                .filter(|attempt| attempt.target.as_str() == target)
                .collect()
        }

        fn next_outcome(&self, target: &Url) -> DeliveryOutcome {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(target.as_str()) {
                Some(script) => script
                    .queued
                    .pop_front()
                    .or_else(|| script.fallback.clone())
                    .unwrap_or(DeliveryOutcome::Delivered),
                None => DeliveryOutcome::Delivered,
            }
        }
    }

    #[async_trait]
    impl DeliveryClient for MockDeliveryClient {
        async fn attempt(
            &self,
            event: &CloudEvent,
            target: &Url,
            mode: ContentMode,
            _timeout: Option<Duration>,
        ) -> DeliveryOutcome {
            self.attempts.lock().unwrap().push(RecordedAttempt {
                event: event.clone(),
                target: target.clone(),
                mode,
                at: Instant::now(),
            });

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            self.next_outcome(target)
        }
    }
}
