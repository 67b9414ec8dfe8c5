//! # Eventing API
//!
//! 通道入口的HTTP服务，基于Axum构建。
//!
//! ## API 端点
//!
//! - `POST /channels/{channel}` - 以binary或structured模式发布CloudEvent
//! - `GET /health` - 健康检查
//! - `GET /metrics` - Prometheus指标
//!
//! ## 状态码
//!
//! | 状态码 | 含义 |
//! |--------|------|
//! | 202 | 事件已持久化 |
//! | 400 | 不是合法的CloudEvent |
//! | 404 | 通道不存在 |
//! | 413 | 请求体超过大小限制 |
//! | 503 | 通道日志不可用 |
//!
//! 错误响应格式：
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "type": "CHANNEL_NOT_FOUND",
//!     "message": "通道不存在: orders",
//!     "code": 404
//!   },
//!   "timestamp": "2024-01-01T00:00:00Z"
//! }
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::time::Duration;

use axum::{extract::DefaultBodyLimit, Router};
use eventing_core::config::IngressConfig;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use middleware::{request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, config: &IngressConfig, metrics_endpoint: &str) -> Router {
    create_routes(state, metrics_endpoint)
        .layer(DefaultBodyLimit::max(config.max_request_size_bytes()))
        .layer(
            ServiceBuilder::new()
                .layer(trace_layer())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_seconds,
                )))
                .layer(axum::middleware::from_fn(request_logging)),
        )
}
