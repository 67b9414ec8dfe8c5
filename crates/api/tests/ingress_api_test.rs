use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use eventing_api::{create_app, routes::AppState};
use eventing_core::codec::{self, STRUCTURED_CONTENT_TYPE};
use eventing_core::config::IngressConfig;
use eventing_core::models::{CloudEvent, ContentMode};
use eventing_core::{ChannelLog, EventingError, IngressReceiver, LogRecord, Result};
use eventing_infrastructure::{InMemoryChannelLog, MetricsCollector, MetricsHandle};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use tower::ServiceExt;

/// 所有操作都返回存储错误的日志
struct UnavailableLog;

#[async_trait]
impl ChannelLog for UnavailableLog {
    async fn create_channel(&self, _channel: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_channel(&self, _channel: &str) -> Result<()> {
        Ok(())
    }

    async fn channel_exists(&self, _channel: &str) -> Result<bool> {
        Ok(true)
    }

    async fn append(&self, _channel: &str, _event: &CloudEvent) -> Result<u64> {
        Err(EventingError::Storage("磁盘不可写".to_string()))
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

fn app_with(log: Arc<dyn ChannelLog>, max_request_size_mb: usize) -> Router {
    let recorder = PrometheusBuilder::new().build_recorder();
    let state = AppState {
        ingress: IngressReceiver::new(log),
        metrics: MetricsCollector::new(),
        metrics_handle: Some(MetricsHandle::new(recorder.handle())),
    };
    let config = IngressConfig {
        max_request_size_mb,
        ..IngressConfig::default()
    };
    create_app(state, &config, "/metrics")
}

async fn memory_app() -> (Router, Arc<InMemoryChannelLog>) {
    let log = Arc::new(InMemoryChannelLog::new());
    log.create_channel("orders").await.unwrap();
    (app_with(log.clone(), 1), log)
}

fn event() -> CloudEvent {
    CloudEvent::builder("e1", "/producer", "com.example.created")
        .data_content_type("application/json")
        .data(r#"{"n":1}"#)
        .build()
        .unwrap()
}

fn publish(channel: &str, mode: ContentMode) -> Request<Body> {
    let message = codec::encode(&event(), mode).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/channels/{channel}"));
    for (name, value) in message.headers() {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(message.into_body())).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_publish_binary_and_structured() {
    let (app, log) = memory_app().await;

    for (i, mode) in [ContentMode::Binary, ContentMode::Structured].into_iter().enumerate() {
        let response = app.clone().oneshot(publish("orders", mode)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        // 成功响应没有响应体，转发到本入口的调度器不会把它当作回复
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(log.record_count("orders").await.unwrap(), i + 1);
    }

    let records = log.read("orders", 0, 10, Duration::ZERO).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.event == event()));
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let (app, log) = memory_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/channels/orders")
        .header("content-type", STRUCTURED_CONTENT_TYPE)
        .body(Body::from(r#"{"specversion":"1.0","id":"1"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "MALFORMED_EVENT");

    let request = Request::builder()
        .method("POST")
        .uri("/channels/orders")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"hello":"world"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(log.record_count("orders").await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_channel_is_not_found() {
    let (app, _) = memory_app().await;

    let response = app
        .oneshot(publish("missing", ContentMode::Binary))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "CHANNEL_NOT_FOUND");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (app, log) = memory_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/channels/orders")
        .header("ce-specversion", "1.0")
        .header("ce-id", "big")
        .header("ce-source", "/producer")
        .header("ce-type", "com.example.big")
        .header("content-type", "application/octet-stream")
        .body(Body::from(vec![0u8; 2 * 1024 * 1024]))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(log.record_count("orders").await.unwrap(), 0);
}

#[tokio::test]
async fn test_storage_failure_is_service_unavailable() {
    let app = app_with(Arc::new(UnavailableLog), 1);

    let response = app
        .oneshot(publish("orders", ContentMode::Binary))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "STORAGE_UNAVAILABLE");
}

#[tokio::test]
async fn test_health_and_metrics_routes() {
    let (app, _) = memory_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_route_disabled() {
    let state = AppState {
        ingress: IngressReceiver::new(Arc::new(InMemoryChannelLog::new())),
        metrics: MetricsCollector::new(),
        metrics_handle: None,
    };
    let app = create_app(state, &IngressConfig::default(), "/metrics");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
