//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Install the Prometheus exporter and its scrape endpoint
//! - Define the pipeline's own health metrics
//! - Bridge recording metrics onto the `metrics` facade (`PrometheusSink`)
//!
//! # Metrics
//! - `observation_listener_failures_total` (counter): by listener, hook
//! - `observation_recordings_vetoed_total` (counter): by recording name
//! - `observation_contexts_missing_total` (counter): by hook
//! - `observation_contexts_in_flight` (gauge): open tracing contexts
//! - `observation_reporter_spans_dropped_total` (counter): by reason
//! - `observation_reporter_spans_sent_total` (counter)
//!
//! # Design Decisions
//! - Low-overhead metric updates through the global recorder
//! - Without an installed recorder every call here is a no-op

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sink::{MetricsSink, SinkError};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_listener_failure(listener: &str, hook: &'static str) {
    ::metrics::counter!(
        "observation_listener_failures_total",
        "listener" => listener.to_string(),
        "hook" => hook
    )
    .increment(1);
}

pub fn record_vetoed(recording: &str) {
    ::metrics::counter!("observation_recordings_vetoed_total", "recording" => recording.to_string())
        .increment(1);
}

pub fn record_predicate_failure(recording: &str) {
    ::metrics::counter!(
        "observation_predicate_failures_total",
        "recording" => recording.to_string()
    )
    .increment(1);
}

pub fn record_missing_context(hook: &'static str) {
    ::metrics::counter!("observation_contexts_missing_total", "hook" => hook).increment(1);
}

pub fn record_contexts_in_flight(count: usize) {
    ::metrics::gauge!("observation_contexts_in_flight").set(count as f64);
}

pub fn record_span_dropped(reason: &'static str) {
    ::metrics::counter!("observation_reporter_spans_dropped_total", "reason" => reason).increment(1);
}

pub fn record_spans_sent(count: usize) {
    ::metrics::counter!("observation_reporter_spans_sent_total").increment(count as u64);
}

fn labels(tags: &[(String, String)]) -> Vec<::metrics::Label> {
    tags.iter()
        .map(|(k, v)| ::metrics::Label::new(k.clone(), v.clone()))
        .collect()
}

/// Writes recording metrics to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusSink;

impl MetricsSink for PrometheusSink {
    fn record_timer(
        &self,
        name: &str,
        tags: &[(String, String)],
        duration: Duration,
    ) -> Result<(), SinkError> {
        ::metrics::histogram!(format!("{name}_seconds"), labels(tags)).record(duration.as_secs_f64());
        Ok(())
    }

    fn increment_counter(&self, name: &str, tags: &[(String, String)]) -> Result<(), SinkError> {
        ::metrics::counter!(format!("{name}_total"), labels(tags)).increment(1);
        Ok(())
    }

    fn adjust_gauge(&self, name: &str, tags: &[(String, String)], delta: f64) -> Result<(), SinkError> {
        ::metrics::gauge!(name.to_string(), labels(tags)).increment(delta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_sink_without_recorder_is_noop() {
        let tags = vec![("outcome".to_string(), "success".to_string())];
        let sink = PrometheusSink;
        assert!(sink.record_timer("checkout", &tags, Duration::from_millis(5)).is_ok());
        assert!(sink.increment_counter("checkout_errors", &tags).is_ok());
        assert!(sink.adjust_gauge("checkout_active", &tags, 1.0).is_ok());
    }

    #[test]
    fn test_labels_preserve_order() {
        let tags = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        let labels = labels(&tags);
        assert_eq!(labels[0].key(), "a");
        assert_eq!(labels[1].value(), "2");
    }
}
