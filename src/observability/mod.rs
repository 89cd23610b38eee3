//! Observability of the pipeline itself.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges through the `metrics` facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON or text)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Recording id flows through every listener log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
