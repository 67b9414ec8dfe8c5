use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Prometheus文本格式的渲染句柄，由 `/metrics` 路由使用
#[derive(Clone)]
pub struct MetricsHandle {
    inner: PrometheusHandle,
}

impl MetricsHandle {
    pub fn new(inner: PrometheusHandle) -> Self {
        Self { inner }
    }

    pub fn render(&self) -> String {
        self.inner.render()
    }
}

/// 安装全局Prometheus记录器
///
/// 指标通过入口服务的HTTP路由暴露，不单独监听端口。
pub fn init_metrics() -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("安装Prometheus指标记录器失败: {}", e))?;

    info!("Prometheus metrics recorder installed");
    Ok(MetricsHandle::new(handle))
}
