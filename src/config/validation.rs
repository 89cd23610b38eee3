//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (queue sizes > 0, probability within [0, 1])
//! - Validate addresses and path prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PipelineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::PipelineConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if let Some(p) = config.tracing.sampler.probability {
        if !(0.0..=1.0).contains(&p) {
            errors.push(ValidationError::new(
                "tracing.sampler.probability",
                format!("{} is outside [0.0, 1.0]", p),
            ));
        }
    }
    if config.tracing.abandoned_after_secs == Some(0) {
        errors.push(ValidationError::new(
            "tracing.abandoned_after_secs",
            "must be greater than zero",
        ));
    }

    if config.metrics.max_tag_values == 0 {
        errors.push(ValidationError::new("metrics.max_tag_values", "must be greater than zero"));
    }

    let reporter = &config.reporter;
    if reporter.queued_max_spans == 0 {
        errors.push(ValidationError::new("reporter.queued_max_spans", "must be greater than zero"));
    }
    if reporter.batch_size == 0 {
        errors.push(ValidationError::new("reporter.batch_size", "must be greater than zero"));
    } else if reporter.batch_size > reporter.queued_max_spans {
        errors.push(ValidationError::new(
            "reporter.batch_size",
            "must not exceed reporter.queued_max_spans",
        ));
    }
    if reporter.message_timeout_ms == 0 {
        errors.push(ValidationError::new("reporter.message_timeout_ms", "must be greater than zero"));
    }

    for path in &config.observation.ignored_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                "observation.ignored_paths",
                format!("'{}' must start with '/'", path),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
