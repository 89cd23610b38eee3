//! Composable observation pipeline.
//!
//! Recordings of operations flow through a chain of listeners that turn them
//! into spans and timer metrics.

// Core
pub mod clock;
pub mod listener;
pub mod recorder;

// Backends
pub mod sink;
pub mod trace;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PipelineConfig;
pub use lifecycle::{Pipeline, PipelineDeps, Shutdown, StartupError};
pub use listener::{CompositeRecordingListener, ListenerError, RecordingListener};
pub use recorder::{Recorder, Recording, RecordingId, RecordingKind};
