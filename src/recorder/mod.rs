//! Recorder facade.
//!
//! # Responsibilities
//! - Assign recording ids and start instants
//! - Consult observation predicates once, at start
//! - Drive the root listener through start / error / restore / stop
//!
//! # Data Flow
//! ```text
//! start(name, tags)
//!     → Recording { id, started_at, tags }
//!     → predicates (any false → no-op recording, no dispatch)
//!     → root.on_start
//! error(&mut rec, cause) → rec.error = cause → root.on_error
//! detach(&rec)           → root.on_detach   (on the thread being left)
//! restore(&rec)          → root.on_restore  (on the thread resuming)
//! stop(&mut rec)         → rec.duration = now - started_at → root.on_stop
//! ```
//!
//! # Design Decisions
//! - All dispatch is synchronous on the calling thread
//! - Lifecycle calls never fail: listener failures are contained by `invoke`,
//!   a panicking predicate is logged and counted as passing
//! - `stop` is idempotent per `RecordingId`: the recorder tracks which ids are
//!   in flight, so a copy of a stopped recording is ignored too

pub mod predicate;
pub mod recording;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::Clock;
use crate::listener::{invoke, panic_message, Hook, RecordingListener};
use crate::observability::metrics;

pub use predicate::{IgnoredPathsPredicate, ObservationPredicate};
pub use recording::{
    ErrorInfo, Recording, RecordingId, RecordingKind, HTTP_METHOD, HTTP_PATH, HTTP_STATUS_CODE,
};

/// Begins, drives, and finalizes recordings.
pub struct Recorder {
    root: Arc<dyn RecordingListener>,
    clock: Arc<dyn Clock>,
    predicates: Vec<Arc<dyn ObservationPredicate>>,
    next_id: AtomicU64,
    in_flight: DashMap<RecordingId, Instant>,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("root", &self.root.name())
            .field("predicates", &self.predicates.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl Recorder {
    pub fn new(root: Arc<dyn RecordingListener>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root,
            clock,
            predicates: Vec::new(),
            next_id: AtomicU64::new(1),
            in_flight: DashMap::new(),
        }
    }

    /// Add a predicate consulted at every start.
    pub fn with_predicate(mut self, predicate: impl ObservationPredicate + 'static) -> Self {
        self.predicates.push(Arc::new(predicate));
        self
    }

    pub fn root(&self) -> &Arc<dyn RecordingListener> {
        &self.root
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Begin a generic recording.
    pub fn start<I, K, V>(&self, name: &str, tags: I) -> Recording
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.start_kind(RecordingKind::Generic, name, tags)
    }

    /// Begin a recording of the given kind.
    pub fn start_kind<I, K, V>(&self, kind: RecordingKind, name: &str, tags: I) -> Recording
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let id = RecordingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut recording = Recording::new(id, name, kind, self.clock.as_ref());
        for (key, value) in tags {
            recording.tag(key, value);
        }

        if let Some(rejected) = self.vetoed_by(name, &recording) {
            tracing::trace!(
                recording_id = %id,
                name,
                predicate = rejected,
                "Recording vetoed"
            );
            metrics::record_vetoed(name);
            recording.mark_noop();
            return recording;
        }

        self.in_flight.insert(id, recording.started_at());
        invoke(self.root.as_ref(), Hook::Start, &recording);
        recording
    }

    /// Index of the first predicate rejecting the recording.
    fn vetoed_by(&self, name: &str, recording: &Recording) -> Option<usize> {
        self.predicates.iter().position(|predicate| {
            match panic::catch_unwind(AssertUnwindSafe(|| predicate.test(name, recording))) {
                Ok(accepted) => !accepted,
                Err(payload) => {
                    tracing::error!(
                        recording_id = %recording.id(),
                        name,
                        panic = panic_message(payload.as_ref()),
                        "Observation predicate panicked, treating it as passing"
                    );
                    metrics::record_predicate_failure(name);
                    false
                }
            }
        })
    }

    fn is_in_flight(&self, recording: &Recording) -> bool {
        !recording.is_noop() && self.in_flight.contains_key(&recording.id())
    }

    /// Attach an error to the recording and notify listeners.
    ///
    /// Ignored once the recording has stopped.
    pub fn error<E>(&self, recording: &mut Recording, cause: &E)
    where
        E: std::error::Error + ?Sized,
    {
        if recording.is_noop() {
            return;
        }
        if !self.is_in_flight(recording) {
            tracing::debug!(recording_id = %recording.id(), "Error after stop ignored");
            return;
        }

        recording.set_error(ErrorInfo::from_error(cause));
        invoke(self.root.as_ref(), Hook::Error, recording);
    }

    /// Release the recording from the calling thread before it moves on.
    ///
    /// Call on the thread that started or last restored the recording. Scopes
    /// can only be released on the thread that opened them, so skipping this
    /// leaves that thread's current span pointing at the recording after it
    /// has ended elsewhere.
    pub fn detach(&self, recording: &Recording) {
        if !self.is_in_flight(recording) {
            return;
        }
        invoke(self.root.as_ref(), Hook::Detach, recording);
    }

    /// Resume the recording on the calling thread.
    ///
    /// The thread it came from must have called `detach` first.
    pub fn restore(&self, recording: &Recording) {
        if !self.is_in_flight(recording) {
            return;
        }
        invoke(self.root.as_ref(), Hook::Restore, recording);
    }

    /// Finish the recording.
    pub fn stop(&self, recording: &mut Recording) {
        if recording.is_noop() {
            return;
        }
        if self.in_flight.remove(&recording.id()).is_none() {
            tracing::debug!(recording_id = %recording.id(), "Recording already stopped");
            return;
        }

        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(recording.started_at());
        recording.set_duration(elapsed);
        invoke(self.root.as_ref(), Hook::Stop, recording);
    }

    /// Recordings started and not yet stopped or forgotten.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop tracking recordings started more than `max_age` before `now`.
    ///
    /// A forgotten recording is treated as stopped: later calls with it are
    /// ignored. Returns the number forgotten.
    pub fn forget_older_than(&self, max_age: Duration, now: Instant) -> usize {
        let mut forgotten = 0;
        self.in_flight.retain(|_, started_at| {
            let keep = now.saturating_duration_since(*started_at) <= max_age;
            if !keep {
                forgotten += 1;
            }
            keep
        });
        forgotten
    }

    /// Record `work` as one recording named `name`.
    ///
    /// An `Err` is attached to the recording before it stops.
    pub fn observe<T, E, F>(&self, name: &str, work: F) -> Result<T, E>
    where
        E: std::error::Error,
        F: FnOnce(&mut Recording) -> Result<T, E>,
    {
        let mut recording = self.start(name, std::iter::empty::<(String, String)>());
        let result = work(&mut recording);
        if let Err(ref e) = result {
            self.error(&mut recording, e);
        }
        self.stop(&mut recording);
        result
    }
}
