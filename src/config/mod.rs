//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PipelineConfig (validated, immutable)
//!     → lifecycle::startup assembles the pipeline from it once
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Reload::between(running, loaded)
//!     → changed [tracing.sampler] sent over a channel, other changes logged
//!     → Pipeline::spawn_reloader swaps the sampler
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    MetricsConfig, ObservabilityConfig, ObservationConfig, PipelineConfig, ReporterConfig,
    SamplerConfig, TracingConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigWatcher, Reload};
