use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use eventing_core::{
    codec::{self, WireMessage},
    config::DeliveryConfig,
    models::{CloudEvent, ContentMode},
    EventingError, Result,
};

/// 单次投递的结果分类
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// 2xx 且响应体为空
    Delivered,
    /// 2xx 且响应体是一个合法的CloudEvent
    DeliveredWithReply(CloudEvent),
    /// 2xx 但响应体不是合法的CloudEvent
    InvalidReply(String),
    /// 超时、连接失败、5xx 或 429
    Retryable(String),
    /// 其余失败，重试没有意义
    Terminal(String),
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered | Self::DeliveredWithReply(_))
    }

    /// 目标返回了2xx，不论响应体是什么
    pub fn is_acknowledged(&self) -> bool {
        self.is_success() || matches!(self, Self::InvalidReply(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::DeliveredWithReply(_) => "delivered_with_reply",
            Self::InvalidReply(_) => "invalid_reply",
            Self::Retryable(_) => "retryable",
            Self::Terminal(_) => "terminal",
        }
    }
}

/// 事件投递客户端接口
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// 以指定模式向目标发送一次事件，不做任何重试
    async fn attempt(
        &self,
        event: &CloudEvent,
        target: &Url,
        mode: ContentMode,
        timeout: Option<Duration>,
    ) -> DeliveryOutcome;
}

/// 基于HTTP的投递客户端
pub struct HttpDeliveryClient {
    client: Client,
    default_timeout: Duration,
}

impl HttpDeliveryClient {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EventingError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            default_timeout: config.default_timeout(),
        })
    }

    fn classify_status(status: StatusCode) -> DeliveryOutcome {
        let reason = format!("HTTP {status}");
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            DeliveryOutcome::Retryable(reason)
        } else {
            DeliveryOutcome::Terminal(reason)
        }
    }

    fn classify_error(error: &reqwest::Error) -> DeliveryOutcome {
        if error.is_timeout() {
            DeliveryOutcome::Retryable(format!("请求超时: {error}"))
        } else if error.is_builder() {
            DeliveryOutcome::Terminal(format!("无法构造请求: {error}"))
        } else {
            DeliveryOutcome::Retryable(format!("连接失败: {error}"))
        }
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    #[instrument(skip(self, event), fields(event_id = %event.id(), target = %target))]
    async fn attempt(
        &self,
        event: &CloudEvent,
        target: &Url,
        mode: ContentMode,
        timeout: Option<Duration>,
    ) -> DeliveryOutcome {
        let message = match codec::encode(event, mode) {
            Ok(message) => message,
            Err(e) => return DeliveryOutcome::Terminal(format!("事件编码失败: {e}")),
        };

        let mut request = self
            .client
            .post(target.clone())
            .timeout(timeout.unwrap_or(self.default_timeout));
        for (name, value) in message.headers() {
            request = request.header(name, value);
        }
        let request = request.body(message.into_body());

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Self::classify_error(&e),
        };

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, "订阅者返回失败状态");
            return Self::classify_status(status);
        }

        let mut reply = WireMessage::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                reply.insert_header(name.as_str(), value);
            }
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return Self::classify_error(&e),
        };
        if body.is_empty() {
            return DeliveryOutcome::Delivered;
        }

        match codec::decode(&reply.with_body(body.to_vec())) {
            Ok(event) => DeliveryOutcome::DeliveredWithReply(event),
            Err(e) => DeliveryOutcome::InvalidReply(format!("invalid reply: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let cases = [
            (StatusCode::INTERNAL_SERVER_ERROR, "retryable"),
            (StatusCode::SERVICE_UNAVAILABLE, "retryable"),
            (StatusCode::TOO_MANY_REQUESTS, "retryable"),
            (StatusCode::BAD_REQUEST, "terminal"),
            (StatusCode::NOT_FOUND, "terminal"),
            (StatusCode::MOVED_PERMANENTLY, "terminal"),
        ];

        for (status, expected) in cases {
            assert_eq!(
                HttpDeliveryClient::classify_status(status).kind(),
                expected,
                "{status}"
            );
        }
    }
}
