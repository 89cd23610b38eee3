//! Recording listeners.
//!
//! # Data Flow
//! ```text
//! Recorder (start/stop/error/restore)
//!     → root CompositeRecordingListener (all-matching)
//!         → tracing composite (first-matching)
//!             → TracingRecordingListener: http client | http server | default
//!                 → TracingContextStore (span + scope per recording)
//!         → MetricsRecordingListener
//!             → MetricsSink (cardinality limited)
//! ```
//!
//! # Design Decisions
//! - Hooks return `Result`; a failing or panicking listener is contained by
//!   `invoke`, logged, counted, and never reaches the recording caller
//! - Listener identity is the `Arc` allocation, used for deduplication
//! - Variants are told apart by `supports` and `as_composite`, not by
//!   downcasting

pub mod composite;
pub mod http;
pub mod timer;
pub mod tracing_context;
pub mod tracing_listener;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

use crate::observability::metrics;
use crate::recorder::Recording;
use crate::sink::SinkError;

pub use composite::{CompositeRecordingListener, MatchPolicy};
pub use http::{DefaultHttpHandler, HttpHandler};
pub use timer::MetricsRecordingListener;
pub use tracing_context::{TracingContext, TracingContextStore};
pub use tracing_listener::{TracingFlavor, TracingRecordingListener};

/// Errors a listener may report from a hook.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Metrics sink rejected a sample.
    #[error("Metrics sink error: {0}")]
    Sink(#[from] SinkError),

    /// Listener-specific failure.
    #[error("Listener failed: {0}")]
    Failed(String),
}

/// Lifecycle hook being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Start,
    Stop,
    Error,
    Restore,
    Detach,
}

impl Hook {
    pub fn as_str(self) -> &'static str {
        match self {
            Hook::Start => "start",
            Hook::Stop => "stop",
            Hook::Error => "error",
            Hook::Restore => "restore",
            Hook::Detach => "detach",
        }
    }

    fn dispatch(
        self,
        listener: &dyn RecordingListener,
        recording: &Recording,
    ) -> Result<(), ListenerError> {
        match self {
            Hook::Start => listener.on_start(recording),
            Hook::Stop => listener.on_stop(recording),
            Hook::Error => listener.on_error(recording),
            Hook::Restore => listener.on_restore(recording),
            Hook::Detach => listener.on_detach(recording),
        }
    }
}

/// Receives lifecycle events for recordings.
pub trait RecordingListener: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &str;

    /// Whether this listener handles the given recording.
    fn supports(&self, _recording: &Recording) -> bool {
        true
    }

    fn on_start(&self, recording: &Recording) -> Result<(), ListenerError>;

    fn on_stop(&self, recording: &Recording) -> Result<(), ListenerError>;

    /// The cause is available as `recording.error()`.
    fn on_error(&self, _recording: &Recording) -> Result<(), ListenerError> {
        Ok(())
    }

    /// The recording resumed on another thread or execution context.
    fn on_restore(&self, _recording: &Recording) -> Result<(), ListenerError> {
        Ok(())
    }

    /// The recording is about to leave the calling thread. Release anything
    /// bound to this thread; `on_restore` follows on the destination.
    fn on_detach(&self, _recording: &Recording) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Composite listeners expose themselves so they can be flattened.
    fn as_composite(&self) -> Option<&CompositeRecordingListener> {
        None
    }
}

/// Identity of a listener allocation.
pub(crate) fn identity(listener: &Arc<dyn RecordingListener>) -> usize {
    Arc::as_ptr(listener) as *const () as usize
}

/// Run one hook on one listener, containing any failure.
///
/// Returns `true` if the hook completed successfully.
pub(crate) fn invoke(listener: &dyn RecordingListener, hook: Hook, recording: &Recording) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| hook.dispatch(listener, recording)));

    match outcome {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(
                listener = listener.name(),
                hook = hook.as_str(),
                recording_id = %recording.id(),
                error = %e,
                "Listener failed, continuing with remaining listeners"
            );
            metrics::record_listener_failure(listener.name(), hook.as_str());
            false
        }
        Err(payload) => {
            tracing::error!(
                listener = listener.name(),
                hook = hook.as_str(),
                recording_id = %recording.id(),
                panic = panic_message(payload.as_ref()),
                "Listener panicked, continuing with remaining listeners"
            );
            metrics::record_listener_failure(listener.name(), hook.as_str());
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
