use chrono::{DateTime, SecondsFormat, Utc};

use super::{WireMessage, BINARY_HEADER_PREFIX, CONTENT_TYPE_HEADER};
use crate::models::{CloudEvent, CloudEventBuilder};
use crate::{EventingError, Result};

pub(super) fn encode(event: &CloudEvent) -> WireMessage {
    let mut message = WireMessage::new();

    let mut put = |name: &str, value: &str| {
        message.insert_header(format!("{BINARY_HEADER_PREFIX}{name}"), percent_encode(value));
    };

    put("specversion", event.spec_version());
    put("id", event.id());
    put("source", event.source());
    put("type", event.event_type());
    if let Some(subject) = event.subject() {
        put("subject", subject);
    }
    if let Some(schema) = event.data_schema() {
        put("dataschema", schema);
    }
    if let Some(time) = event.time() {
        put("time", &time.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    for (name, value) in event.extensions() {
        put(name, value);
    }

    if let Some(content_type) = event.data_content_type() {
        message.insert_header(CONTENT_TYPE_HEADER, content_type);
    }
    if let Some(data) = event.data() {
        message = message.with_body(data.to_vec());
    }
    message
}

pub(super) fn decode(message: &WireMessage) -> Result<CloudEvent> {
    let attribute = |name: &str| -> Result<Option<String>> {
        message
            .header(&format!("{BINARY_HEADER_PREFIX}{name}"))
            .map(percent_decode)
            .transpose()
    };

    let required = |name: &str| -> Result<String> {
        attribute(name)?
            .ok_or_else(|| EventingError::malformed(format!("缺少必填属性: {name}")))
    };

    let mut builder = CloudEventBuilder::new(required("id")?, required("source")?, required("type")?)
        .spec_version(required("specversion")?);

    if let Some(subject) = attribute("subject")? {
        builder = builder.subject(subject);
    }
    if let Some(schema) = attribute("dataschema")? {
        builder = builder.data_schema(schema);
    }
    if let Some(time) = attribute("time")? {
        builder = builder.time(parse_time(&time)?);
    }
    if let Some(content_type) = message.header(CONTENT_TYPE_HEADER) {
        builder = builder.data_content_type(content_type);
    }

    for (name, value) in message.headers() {
        let Some(attribute_name) = name.strip_prefix(BINARY_HEADER_PREFIX) else {
            continue;
        };
        if matches!(
            attribute_name,
            "id" | "source" | "type" | "specversion" | "subject" | "dataschema" | "time"
        ) {
            continue;
        }
        builder = builder.extension(attribute_name, percent_decode(value)?);
    }

    builder.data(message.body().to_vec()).build()
}

pub(super) fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| EventingError::malformed(format!("无效的time属性 {raw}: {e}")))
}

/// 按HTTP绑定规范对头部值做百分号编码：空格、双引号、百分号以及可打印ASCII之外的字节
fn percent_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        if (0x21..=0x7e).contains(&byte) && byte != b'"' && byte != b'%' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn percent_decode(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| EventingError::malformed(format!("无效的百分号编码: {value}")))?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded)
        .map_err(|_| EventingError::malformed(format!("属性值不是合法的UTF-8: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_headers() {
        let event = CloudEvent::builder("42", "/orders", "order.created")
            .data_content_type("application/json")
            .data(r#"{"a":1}"#)
            .extension("traceparent", "00-abc")
            .build()
            .unwrap();

        let wire = encode(&event);
        assert_eq!(wire.header("ce-id"), Some("42"));
        assert_eq!(wire.header("ce-specversion"), Some("1.0"));
        assert_eq!(wire.header("ce-traceparent"), Some("00-abc"));
        assert_eq!(wire.header("content-type"), Some("application/json"));
        assert_eq!(wire.body(), br#"{"a":1}"#);
    }

    #[test]
    fn test_percent_encoding() {
        assert_eq!(percent_encode("a b\"c%"), "a%20b%22c%25");
        assert_eq!(percent_encode("é"), "%C3%A9");
        assert_eq!(percent_decode("%C3%A9x").unwrap(), "éx");
        assert!(percent_decode("%G1").is_err());
        assert!(percent_decode("%4").is_err());
    }

    #[test]
    fn test_decode_missing_attribute() {
        let wire = WireMessage::new()
            .with_header("ce-specversion", "1.0")
            .with_header("ce-id", "1")
            .with_header("ce-type", "t");
        let err = decode(&wire).unwrap_err();
        assert!(err.to_string().contains("source"));
    }

    #[test]
    fn test_decode_bad_time_and_content_type() {
        let base = WireMessage::new()
            .with_header("ce-specversion", "1.0")
            .with_header("ce-id", "1")
            .with_header("ce-source", "/s")
            .with_header("ce-type", "t");

        let bad_time = base.clone().with_header("ce-time", "yesterday");
        assert!(matches!(decode(&bad_time), Err(EventingError::MalformedEvent(_))));

        let bad_content_type = base.with_header("content-type", "not a media type");
        assert!(matches!(
            decode(&bad_content_type),
            Err(EventingError::MalformedEvent(_))
        ));
    }
}
