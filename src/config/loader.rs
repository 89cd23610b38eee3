//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::PipelineConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.reporter.queued_max_spans, 1000);
        assert_eq!(config.tracing.sampler.rate, 10);
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [tracing]
            http_server = true

            [tracing.sampler]
            probability = 0.25

            [observation]
            ignored_paths = ["/actuator"]
            "#,
        )
        .unwrap();

        assert!(config.tracing.enabled);
        assert!(config.tracing.http_server);
        assert_eq!(config.tracing.sampler.probability, Some(0.25));
        assert_eq!(config.observation.ignored_paths, vec!["/actuator"]);
    }

    #[test]
    fn test_reports_every_validation_error() {
        let err = parse_config(
            r#"
            [reporter]
            queued_max_spans = 0
            batch_size = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_syntax_error_is_parse_error() {
        assert!(matches!(parse_config("[tracing"), Err(ConfigError::Parse(_))));
    }
}
