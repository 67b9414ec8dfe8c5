use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::{HeaderMap, StatusCode},
};
use eventing_core::{codec::WireMessage, Accepted};
use tracing::{debug, instrument};

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

/// 接收发布到通道的事件
///
/// 事件持久化追加到通道日志后返回空响应体的202。
/// 上游调度器会把非空的2xx响应体当作回复事件解析，所以成功时不能带响应体。
#[instrument(skip(state, headers, body), fields(channel = %channel))]
pub async fn receive_event(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<StatusCode> {
    let result = accept(&state, &channel, headers, body).await;

    match &result {
        Ok(_) => state.metrics.record_event_received(&channel),
        Err(e) => state.metrics.record_event_rejected(&channel, e.classify().1),
    }

    let accepted = result?;
    debug!(event_id = %accepted.event_id, offset = accepted.offset, "事件已接收");
    Ok(StatusCode::ACCEPTED)
}

async fn accept(
    state: &AppState,
    channel: &str,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Accepted> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;

    let mut message = WireMessage::new().with_body(body.to_vec());
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            message.insert_header(name.as_str(), value);
        }
    }

    Ok(state.ingress.receive(channel, &message).await?)
}
