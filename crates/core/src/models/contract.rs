use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::iso_duration;
use crate::{EventingError, Result};

/// CloudEvents传输编码模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// 属性映射为传输头，负载作为消息体
    #[default]
    Binary,
    /// 整个事件序列化为一个自描述的JSON消息体
    Structured,
}

/// 退避策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffPolicy {
    Linear,
    #[default]
    Exponential,
}

fn default_backoff_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_backoff_base() -> f64 {
    2.0
}

/// 投递配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverySpec {
    /// 首次投递失败后的最大重试次数
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub backoff_policy: BackoffPolicy,
    #[serde(default = "default_backoff_delay", with = "iso_duration")]
    pub backoff_delay: Duration,
    /// 指数退避的倍数
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    #[serde(default, with = "iso_duration::option", skip_serializing_if = "Option::is_none")]
    pub backoff_cap: Option<Duration>,
    /// 单次请求超时
    #[serde(default, with = "iso_duration::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Default for DeliverySpec {
    fn default() -> Self {
        Self {
            retry: 0,
            backoff_policy: BackoffPolicy::default(),
            backoff_delay: default_backoff_delay(),
            backoff_base: default_backoff_base(),
            backoff_cap: None,
            timeout: None,
        }
    }
}

impl DeliverySpec {
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy, delay: Duration) -> Self {
        self.backoff_policy = policy;
        self.backoff_delay = delay;
        self
    }

    pub fn with_backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = Some(cap);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(EventingError::InvalidContract(format!(
                "退避倍数必须不小于1: {}",
                self.backoff_base
            )));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(EventingError::InvalidContract("请求超时必须大于0".to_string()));
        }
        Ok(())
    }
}

/// 回复目的地
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// 通过HTTP投递回复事件
    Uri(Url),
    /// 将回复事件追加到另一个通道的日志
    Channel(String),
}

fn empty_url_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<Url>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => Url::parse(&raw).map(Some).map_err(serde::de::Error::custom),
    }
}

/// 订阅
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub uid: String,
    /// 空字符串视为未配置
    #[serde(
        default,
        deserialize_with = "empty_url_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub subscriber: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Destination>,
    #[serde(
        default,
        deserialize_with = "empty_url_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub dead_letter_sink: Option<Url>,
    #[serde(default)]
    pub content_mode: ContentMode,
    #[serde(default)]
    pub delivery: DeliverySpec,
}

impl Subscription {
    pub fn new(uid: impl Into<String>, subscriber: Url) -> Self {
        Self {
            uid: uid.into(),
            subscriber: Some(subscriber),
            reply: None,
            dead_letter_sink: None,
            content_mode: ContentMode::default(),
            delivery: DeliverySpec::default(),
        }
    }

    /// 没有订阅者、只把事件原样转发给回复目的地的订阅
    pub fn reply_only(uid: impl Into<String>, reply: Destination) -> Self {
        Self {
            uid: uid.into(),
            subscriber: None,
            reply: Some(reply),
            dead_letter_sink: None,
            content_mode: ContentMode::default(),
            delivery: DeliverySpec::default(),
        }
    }

    pub fn with_reply(mut self, reply: Destination) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn with_dead_letter_sink(mut self, sink: Url) -> Self {
        self.dead_letter_sink = Some(sink);
        self
    }

    pub fn with_content_mode(mut self, mode: ContentMode) -> Self {
        self.content_mode = mode;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliverySpec) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.uid.trim().is_empty() {
            return Err(EventingError::InvalidContract("订阅uid不能为空".to_string()));
        }
        if self.subscriber.is_none() && self.reply.is_none() {
            return Err(EventingError::InvalidContract(format!(
                "订阅 {} 必须至少声明subscriber或reply之一",
                self.uid
            )));
        }
        if let Some(Destination::Channel(channel)) = &self.reply {
            if channel.trim().is_empty() {
                return Err(EventingError::InvalidContract(format!(
                    "订阅 {} 的回复通道名不能为空",
                    self.uid
                )));
            }
        }
        self.delivery.validate()
    }
}

/// 一个通道的订阅契约
///
/// 契约是不可变值，更新时整体替换。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    #[serde(default)]
    pub generation: u64,
    /// 通道级死信接收端，订阅未配置时使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_sink: Option<Url>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl Contract {
    pub fn new(generation: u64, subscriptions: Vec<Subscription>) -> Self {
        Self {
            generation,
            dead_letter_sink: None,
            subscriptions,
        }
    }

    pub fn with_dead_letter_sink(mut self, sink: Url) -> Self {
        self.dead_letter_sink = Some(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// 订阅自己的死信接收端优先，其次通道级
    pub fn dead_letter_sink_for<'a>(&'a self, subscription: &'a Subscription) -> Option<&'a Url> {
        subscription
            .dead_letter_sink
            .as_ref()
            .or(self.dead_letter_sink.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for subscription in &self.subscriptions {
            subscription.validate()?;
            if !seen.insert(subscription.uid.as_str()) {
                return Err(EventingError::InvalidContract(format!(
                    "重复的订阅uid: {}",
                    subscription.uid
                )));
            }
        }
        Ok(())
    }
}
