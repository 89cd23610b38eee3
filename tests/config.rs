//! Loading configuration files from disk and building pipelines from them.

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use observation_pipeline::config::{load_config, ConfigError};
use observation_pipeline::lifecycle::{Pipeline, PipelineDeps, StartupError};
use observation_pipeline::listener::DefaultHttpHandler;
use observation_pipeline::sink::InMemorySink;
use observation_pipeline::trace::InMemoryReporter;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn deps() -> PipelineDeps {
    PipelineDeps::new(Arc::new(InMemoryReporter::new()), Arc::new(InMemorySink::new()))
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
        [observability]
        log_level = "debug"
        json = true
        metrics_enabled = false

        [tracing]
        http_client = true
        abandoned_after_secs = 300

        [tracing.sampler]
        rate = 50

        [metrics]
        max_tag_values = 20

        [reporter]
        queued_max_spans = 500
        batch_size = 50
        message_timeout_ms = 250

        [observation]
        ignored_paths = ["/actuator", "/favicon.ico"]
        "#,
    );

    let config = load_config(file.path()).unwrap();
    assert!(config.observability.json);
    assert_eq!(config.tracing.abandoned_after_secs, Some(300));
    assert_eq!(config.tracing.sampler.rate, 50);
    assert_eq!(config.metrics.max_tag_values, 20);
    assert_eq!(config.reporter.batch_size, 50);
    assert_eq!(config.observation.ignored_paths.len(), 2);

    let pipeline =
        Pipeline::from_config(&config, deps().with_http_client(Arc::new(DefaultHttpHandler)));
    assert!(pipeline.is_ok());
}

#[test]
fn test_enabled_flavor_without_handler_fails_startup() {
    let file = write_config(
        r#"
        [tracing]
        http_client = true
        "#,
    );
    let config = load_config(file.path()).unwrap();

    match Pipeline::from_config(&config, deps()) {
        Err(StartupError::MissingHttpHandler { flavor }) => assert_eq!(flavor, "HTTP client"),
        Ok(_) => panic!("pipeline assembled without a client handler"),
    }
}

#[test]
fn test_invalid_values_are_all_reported() {
    let file = write_config(
        r#"
        [tracing.sampler]
        probability = 2.0

        [reporter]
        message_timeout_ms = 0
        "#,
    );

    match load_config(file.path()) {
        Err(ConfigError::Validation(errors)) => {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["tracing.sampler.probability", "reporter.message_timeout_ms"]);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_config(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
