use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::SecondsFormat;
use serde_json::{Map, Value};

use super::binary::parse_time;
use super::{WireMessage, CONTENT_TYPE_HEADER, STRUCTURED_CONTENT_TYPE};
use crate::models::{is_json_media_type, media_type_essence, CloudEvent, CloudEventBuilder};
use crate::{EventingError, Result};

pub(super) fn encode(event: &CloudEvent) -> Result<WireMessage> {
    let mut object = Map::new();
    object.insert("specversion".into(), event.spec_version().into());
    object.insert("id".into(), event.id().into());
    object.insert("source".into(), event.source().into());
    object.insert("type".into(), event.event_type().into());

    if let Some(content_type) = event.data_content_type() {
        object.insert("datacontenttype".into(), content_type.into());
    }
    if let Some(schema) = event.data_schema() {
        object.insert("dataschema".into(), schema.into());
    }
    if let Some(subject) = event.subject() {
        object.insert("subject".into(), subject.into());
    }
    if let Some(time) = event.time() {
        object.insert(
            "time".into(),
            time.to_rfc3339_opts(SecondsFormat::AutoSi, true).into(),
        );
    }
    for (name, value) in event.extensions() {
        object.insert(name.clone(), value.as_str().into());
    }

    if let Some(data) = event.data() {
        let (key, value) = encode_data(event.data_content_type(), data);
        object.insert(key.into(), value);
    }

    let body = serde_json::to_vec(&Value::Object(object))?;
    Ok(WireMessage::new()
        .with_header(CONTENT_TYPE_HEADER, STRUCTURED_CONTENT_TYPE)
        .with_body(body))
}

/// 负载只在能逐字节还原时才内联为 `data`，否则使用 `data_base64`
fn encode_data(content_type: Option<&str>, data: &[u8]) -> (&'static str, Value) {
    if let Some(content_type) = content_type {
        if is_json_media_type(content_type) {
            if let Ok(value) = serde_json::from_slice::<Value>(data) {
                if serde_json::to_vec(&value).ok().as_deref() == Some(data) {
                    return ("data", value);
                }
            }
        } else if media_type_essence(content_type).starts_with("text/") {
            if let Ok(text) = std::str::from_utf8(data) {
                return ("data", Value::String(text.to_string()));
            }
        }
    }
    ("data_base64", Value::String(STANDARD.encode(data)))
}

pub(super) fn decode(message: &WireMessage) -> Result<CloudEvent> {
    decode_body(message.body())
}

pub(super) fn decode_body(body: &[u8]) -> Result<CloudEvent> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| EventingError::malformed(format!("结构化消息体不是合法JSON: {e}")))?;
    let Value::Object(mut object) = value else {
        return Err(EventingError::malformed("结构化消息体必须是JSON对象"));
    };

    let mut take_string = |name: &str| -> Result<Option<String>> {
        match object.remove(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(EventingError::malformed(format!(
                "属性 {name} 必须是字符串，实际为: {other}"
            ))),
        }
    };

    let mut required = |name: &str| -> Result<String> {
        take_string(name)?
            .ok_or_else(|| EventingError::malformed(format!("缺少必填属性: {name}")))
    };

    let id = required("id")?;
    let source = required("source")?;
    let event_type = required("type")?;
    let spec_version = required("specversion")?;

    let mut builder = CloudEventBuilder::new(id, source, event_type).spec_version(spec_version);

    let content_type = take_string("datacontenttype")?;
    if let Some(content_type) = &content_type {
        builder = builder.data_content_type(content_type.clone());
    }
    if let Some(schema) = take_string("dataschema")? {
        builder = builder.data_schema(schema);
    }
    if let Some(subject) = take_string("subject")? {
        builder = builder.subject(subject);
    }
    if let Some(time) = take_string("time")? {
        builder = builder.time(parse_time(&time)?);
    }

    let data_base64 = take_string("data_base64")?;
    let data = object.remove("data");
    match (data, data_base64) {
        (Some(_), Some(_)) => {
            return Err(EventingError::malformed("data与data_base64不能同时出现"));
        }
        (None, Some(encoded)) => {
            let bytes = STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| EventingError::malformed(format!("无效的data_base64: {e}")))?;
            builder = builder.data(bytes);
        }
        (Some(Value::Null), None) | (None, None) => {}
        (Some(value), None) => {
            builder = builder.data(decode_data(content_type.as_deref(), value)?);
        }
    }

    for (name, value) in object {
        let value = match value {
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => continue,
            other => {
                return Err(EventingError::malformed(format!(
                    "扩展属性 {name} 的值类型不受支持: {other}"
                )))
            }
        };
        builder = builder.extension(name, value);
    }

    builder.build()
}

/// 未声明内容类型时按规范视为JSON
fn decode_data(content_type: Option<&str>, value: Value) -> Result<Vec<u8>> {
    let is_json = content_type.map_or(true, is_json_media_type);
    match value {
        Value::String(text) if !is_json => Ok(text.into_bytes()),
        other => Ok(serde_json::to_vec(&other)?),
    }
}
