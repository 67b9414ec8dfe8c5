//! Metrics collector for the eventing data plane
//!
//! Counters are labelled by channel and, where it applies, by subscription uid.
//! Nothing is recorded until a global recorder is installed.

use metrics::{counter, gauge, histogram, Gauge, Histogram};
use tracing::debug;

/// Metrics collector for ingress and dispatch
#[derive(Clone)]
pub struct MetricsCollector {
    active_channels: Gauge,
    delivery_attempt_duration: Histogram,
    event_dispatch_duration: Histogram,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            active_channels: gauge!("eventing_active_channels"),
            delivery_attempt_duration: histogram!("eventing_delivery_attempt_duration_seconds"),
            event_dispatch_duration: histogram!("eventing_event_dispatch_duration_seconds"),
        }
    }

    // Ingress metrics

    /// Record an event appended to a channel log
    pub fn record_event_received(&self, channel: &str) {
        counter!("eventing_events_received_total", "channel" => channel.to_string()).increment(1);
    }

    /// Record an event refused by the ingress
    pub fn record_event_rejected(&self, channel: &str, reason: &str) {
        counter!(
            "eventing_events_rejected_total",
            "channel" => channel.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);

        debug!(channel = channel, reason = reason, "Event rejected");
    }

    // Dispatch metrics

    /// Record a single HTTP delivery attempt and its classification
    pub fn record_delivery_attempt(
        &self,
        channel: &str,
        subscription: &str,
        result: &str,
        duration_seconds: f64,
    ) {
        counter!(
            "eventing_delivery_attempts_total",
            "channel" => channel.to_string(),
            "subscription" => subscription.to_string(),
            "result" => result.to_string()
        )
        .increment(1);
        self.delivery_attempt_duration.record(duration_seconds);
    }

    /// Record a scheduled retry
    pub fn record_retry(&self, channel: &str, subscription: &str) {
        counter!(
            "eventing_delivery_retries_total",
            "channel" => channel.to_string(),
            "subscription" => subscription.to_string()
        )
        .increment(1);
    }

    /// Record the final outcome of one event for one subscription
    pub fn record_dispatch_outcome(&self, channel: &str, subscription: &str, outcome: &str) {
        counter!(
            "eventing_dispatch_outcomes_total",
            "channel" => channel.to_string(),
            "subscription" => subscription.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }

    /// Record a dead-letter delivery attempt
    pub fn record_dead_letter(&self, channel: &str, success: bool) {
        let name = if success {
            "eventing_dead_letter_deliveries_total"
        } else {
            "eventing_dead_letter_failures_total"
        };
        counter!(name, "channel" => channel.to_string()).increment(1);
    }

    /// Record time spent dispatching one event to every subscription
    pub fn record_event_dispatch_duration(&self, duration_seconds: f64) {
        self.event_dispatch_duration.record(duration_seconds);
    }

    pub fn update_committed_offset(&self, channel: &str, offset: u64) {
        gauge!("eventing_committed_offset", "channel" => channel.to_string()).set(offset as f64);
    }

    pub fn update_active_channels(&self, count: usize) {
        self.active_channels.set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_metrics_are_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let collector = MetricsCollector::new();
            collector.record_event_received("orders");
            collector.record_delivery_attempt("orders", "sub-1", "retryable", 0.02);
            collector.record_dispatch_outcome("orders", "sub-1", "dead_lettered");
            collector.record_dead_letter("orders", true);
            collector.update_active_channels(3);
        });

        let rendered = handle.render();
        assert!(rendered.contains("eventing_events_received_total{channel=\"orders\"} 1"));
        assert!(rendered.contains("eventing_delivery_attempts_total"));
        assert!(rendered.contains("outcome=\"dead_lettered\""));
        assert!(rendered.contains("eventing_dead_letter_deliveries_total"));
        assert!(rendered.contains("eventing_active_channels 3"));
    }
}
