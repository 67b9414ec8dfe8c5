use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{EventingError, Result};

/// 支持的CloudEvents规范版本
pub const SPEC_VERSION: &str = "1.0";

/// 上下文属性名，扩展属性不得与之重名
const RESERVED_ATTRIBUTES: [&str; 10] = [
    "id",
    "source",
    "type",
    "specversion",
    "datacontenttype",
    "dataschema",
    "subject",
    "time",
    "data",
    "data_base64",
];

/// 不可变的CloudEvent
///
/// 只能通过 [`CloudEventBuilder`] 构造，构造时完成全部校验，
/// 因此任何 `CloudEvent` 实例都是合法事件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEvent {
    id: String,
    source: String,
    event_type: String,
    spec_version: String,
    data_content_type: Option<String>,
    data_schema: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<Utc>>,
    data: Option<Vec<u8>>,
    extensions: BTreeMap<String, String>,
}

impl CloudEvent {
    pub fn builder(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> CloudEventBuilder {
        CloudEventBuilder::new(id, source, event_type)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn spec_version(&self) -> &str {
        &self.spec_version
    }

    pub fn data_content_type(&self) -> Option<&str> {
        self.data_content_type.as_deref()
    }

    pub fn data_schema(&self) -> Option<&str> {
        self.data_schema.as_deref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn time(&self) -> Option<&DateTime<Utc>> {
        self.time.as_ref()
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }

    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }
}

/// CloudEvent构建器
#[derive(Debug, Clone)]
pub struct CloudEventBuilder {
    id: String,
    source: String,
    event_type: String,
    spec_version: String,
    data_content_type: Option<String>,
    data_schema: Option<String>,
    subject: Option<String>,
    time: Option<DateTime<Utc>>,
    data: Option<Vec<u8>>,
    extensions: BTreeMap<String, String>,
}

impl CloudEventBuilder {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            spec_version: SPEC_VERSION.to_string(),
            data_content_type: None,
            data_schema: None,
            subject: None,
            time: None,
            data: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn spec_version(mut self, spec_version: impl Into<String>) -> Self {
        self.spec_version = spec_version.into();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn data_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.data_content_type = Some(content_type.into());
        self
    }

    pub fn data_schema(mut self, schema: impl Into<String>) -> Self {
        self.data_schema = Some(schema.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// 空负载等同于没有负载，二进制模式下两者无法区分
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        self.data = if data.is_empty() { None } else { Some(data) };
        self
    }

    pub fn extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Result<CloudEvent> {
        for (name, value) in [
            ("id", &self.id),
            ("source", &self.source),
            ("type", &self.event_type),
            ("specversion", &self.spec_version),
        ] {
            if value.trim().is_empty() {
                return Err(EventingError::malformed(format!("缺少必填属性: {name}")));
            }
        }

        if self.spec_version != SPEC_VERSION {
            return Err(EventingError::malformed(format!(
                "不支持的specversion: {}",
                self.spec_version
            )));
        }

        if let Some(content_type) = &self.data_content_type {
            if !is_valid_media_type(content_type) {
                return Err(EventingError::malformed(format!(
                    "无法解析的datacontenttype: {content_type}"
                )));
            }
        }

        for name in self.extensions.keys() {
            if !is_valid_extension_name(name) {
                return Err(EventingError::malformed(format!(
                    "无效的扩展属性名: {name}"
                )));
            }
        }

        Ok(CloudEvent {
            id: self.id,
            source: self.source,
            event_type: self.event_type,
            spec_version: self.spec_version,
            data_content_type: self.data_content_type,
            data_schema: self.data_schema,
            subject: self.subject,
            time: self.time,
            data: self.data,
            extensions: self.extensions,
        })
    }
}

/// 扩展属性名只允许小写字母和数字，且不能与上下文属性重名
pub fn is_valid_extension_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && !RESERVED_ATTRIBUTES.contains(&name)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '!' | '#' | '$' | '&' | '-' | '^' | '_' | '.' | '+' | '*' | '\'')
        })
}

/// 校验 `type/subtype[; name=value]*` 形式的媒体类型
pub fn is_valid_media_type(content_type: &str) -> bool {
    let mut parts = content_type.split(';');
    let essence = parts.next().unwrap_or_default().trim();

    let Some((main_type, sub_type)) = essence.split_once('/') else {
        return false;
    };
    if !is_token(main_type) || !is_token(sub_type) {
        return false;
    }

    parts.all(|param| {
        let param = param.trim();
        match param.split_once('=') {
            Some((name, value)) => {
                let value = value.trim();
                let quoted = value.len() >= 2 && value.starts_with('"') && value.ends_with('"');
                is_token(name.trim()) && (quoted || is_token(value))
            }
            None => false,
        }
    })
}

/// 媒体类型本体（去掉参数并转小写）
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_json_media_type(content_type: &str) -> bool {
    let essence = media_type_essence(content_type);
    essence == "application/json" || essence == "text/json" || essence.ends_with("+json")
}
