//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the pipeline.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the observation pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Logging and metrics exposition.
    pub observability: ObservabilityConfig,

    /// Tracing listeners and sampling.
    pub tracing: TracingConfig,

    /// Recording timer metrics.
    pub metrics: MetricsConfig,

    /// Span reporter queue and batching.
    pub reporter: ReporterConfig,

    /// Start-time vetoes.
    pub observation: ObservationConfig,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TracingConfig {
    /// Install the tracing listeners at all.
    pub enabled: bool,

    /// Add the HTTP client tracing listener. Requires a client handler.
    pub http_client: bool,

    /// Add the HTTP server tracing listener. Requires a server handler.
    pub http_server: bool,

    /// Evict contexts of recordings never stopped after this many seconds.
    /// Disabled when unset.
    pub abandoned_after_secs: Option<u64>,

    pub sampler: SamplerConfig,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            http_client: false,
            http_server: false,
            abandoned_after_secs: None,
            sampler: SamplerConfig::default(),
        }
    }
}

/// Trace sampling. A probability, when set, takes precedence over the rate.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SamplerConfig {
    /// Fraction of traces to keep, between 0.0 and 1.0.
    pub probability: Option<f64>,

    /// Maximum new traces per second.
    pub rate: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            probability: None,
            rate: 10,
        }
    }
}

/// Recording metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Install the metrics listener.
    pub enabled: bool,

    /// Maximum distinct values per tag key and metric before new values are
    /// denied.
    pub max_tag_values: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tag_values: 100,
        }
    }
}

/// Span reporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ReporterConfig {
    /// Spans held in memory before new ones are dropped.
    pub queued_max_spans: usize,

    /// Spans per batch handed to the sender.
    pub batch_size: usize,

    /// Longest a span waits before its batch is flushed, in milliseconds.
    pub message_timeout_ms: u64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            queued_max_spans: 1000,
            batch_size: 100,
            message_timeout_ms: 1000,
        }
    }
}

/// Observation predicate configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ObservationConfig {
    /// Server request paths starting with any of these are not observed.
    pub ignored_paths: Vec<String>,
}
