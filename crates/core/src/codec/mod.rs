//! CloudEvents编解码
//!
//! 提供二进制模式和结构化模式两种传输编码。[`WireMessage`] 与具体传输无关，
//! 由HTTP层负责与请求/响应之间的转换。

mod binary;
mod structured;

use std::collections::BTreeMap;

use crate::models::{media_type_essence, CloudEvent, ContentMode};
use crate::{EventingError, Result};

/// 结构化模式的消息体类型
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";
/// 批量结构化模式，当前不支持
pub const BATCH_CONTENT_TYPE: &str = "application/cloudevents-batch+json";
pub const CONTENT_TYPE_HEADER: &str = "content-type";
/// 二进制模式下属性头的前缀
pub const BINARY_HEADER_PREFIX: &str = "ce-";

/// 与传输无关的线上消息：小写的头部表加消息体
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireMessage {
    headers: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl WireMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn insert_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// 判断消息采用的编码模式，不是CloudEvent时返回 `None`
    pub fn content_mode(&self) -> Option<ContentMode> {
        let content_type = self.header(CONTENT_TYPE_HEADER).map(media_type_essence);
        if content_type.as_deref() == Some(STRUCTURED_CONTENT_TYPE) {
            return Some(ContentMode::Structured);
        }
        if self.header("ce-specversion").is_some() {
            return Some(ContentMode::Binary);
        }
        None
    }
}

/// 按指定模式编码事件
pub fn encode(event: &CloudEvent, mode: ContentMode) -> Result<WireMessage> {
    match mode {
        ContentMode::Binary => Ok(binary::encode(event)),
        ContentMode::Structured => structured::encode(event),
    }
}

/// 解码线上消息，自动识别编码模式
pub fn decode(message: &WireMessage) -> Result<CloudEvent> {
    let content_type = message.header(CONTENT_TYPE_HEADER).map(media_type_essence);
    if content_type.as_deref() == Some(BATCH_CONTENT_TYPE) {
        return Err(EventingError::malformed("不支持批量模式的CloudEvents"));
    }

    match message.content_mode() {
        Some(ContentMode::Structured) => structured::decode(message),
        Some(ContentMode::Binary) => binary::decode(message),
        None => Err(EventingError::malformed(
            "消息既不是结构化模式也不是二进制模式的CloudEvent",
        )),
    }
}

/// 结构化模式下事件序列化为JSON，供持久化日志存储使用
pub fn to_json_bytes(event: &CloudEvent) -> Result<Vec<u8>> {
    structured::encode(event).map(WireMessage::into_body)
}

pub fn from_json_bytes(bytes: &[u8]) -> Result<CloudEvent> {
    structured::decode_body(bytes)
}
