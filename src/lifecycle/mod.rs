//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Assemble listener chain → Start background tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop producing recordings → Drain span queue → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then sampler and tracer, then listeners
//! - Ordered shutdown: stop recording, drain reporter, close

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Pipeline, PipelineDeps, StartupError};
