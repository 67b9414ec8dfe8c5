use axum::{
    routing::{get, post},
    Router,
};

use eventing_core::IngressReceiver;
use eventing_infrastructure::{MetricsCollector, MetricsHandle};

use crate::handlers::{health::health_check, ingress::receive_event, metrics::render_metrics};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub ingress: IngressReceiver,
    pub metrics: MetricsCollector,
    /// 未启用指标时为空，指标路由返回404
    pub metrics_handle: Option<MetricsHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState, metrics_endpoint: &str) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 事件入口
        .route("/channels/{channel}", post(receive_event))
        // 指标
        .route(metrics_endpoint, get(render_metrics))
        .with_state(state)
}
