//! 可观测性模块
//!
//! 指标采集与Prometheus导出。

pub mod metrics_collector;
pub mod prometheus;

pub use metrics_collector::MetricsCollector;
pub use prometheus::{init_metrics, MetricsHandle};
