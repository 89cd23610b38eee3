//! Spans: the tracing backend's unit of work.
//!
//! # Responsibilities
//! - Identify a span within its trace (`SpanContext`)
//! - Accumulate name, kind, tags, and error while in flight
//! - Hand a `FinishedSpan` to the reporter exactly once, on end
//!
//! # Design Decisions
//! - `Span` is a cheap clonable handle; clones share state
//! - Ending twice is a no-op, so cleanup paths can call `end` unconditionally
//! - Unsampled spans are tracked in full but never reported

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::{Serialize, Serializer};

use crate::clock::Clock;
use crate::trace::reporter::SpanReporter;

/// Longest span name kept; longer names are truncated.
pub const MAX_SPAN_NAME_LENGTH: usize = 50;

/// Identity of a span and its place in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub parent_id: Option<u64>,
    pub sampled: bool,
}

impl SpanContext {
    /// True when this span starts its trace.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl fmt::Display for SpanContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "00-{:032x}-{:016x}-{:02x}",
            self.trace_id,
            self.span_id,
            u8::from(self.sampled)
        )
    }
}

/// Role of the span in a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanKind {
    Client,
    Server,
}

/// A completed span, shaped like the Zipkin v2 JSON model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedSpan {
    #[serde(serialize_with = "hex_u128")]
    pub trace_id: u128,
    #[serde(serialize_with = "hex_u64")]
    pub id: u64,
    #[serde(serialize_with = "hex_opt_u64", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SpanKind>,
    /// Start, in microseconds since the Unix epoch.
    pub timestamp: u64,
    /// Duration in microseconds.
    pub duration: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

fn hex_u128<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:032x}", value))
}

fn hex_u64<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{:016x}", value))
}

fn hex_opt_u64<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => hex_u64(v, serializer),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Default)]
struct SpanState {
    name: String,
    kind: Option<SpanKind>,
    started: Option<(Instant, u64)>,
    tags: BTreeMap<String, String>,
    error: Option<String>,
    finished: bool,
}

/// Handle to an in-flight span.
#[derive(Clone)]
pub struct Span {
    context: SpanContext,
    state: Arc<Mutex<SpanState>>,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn SpanReporter>,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span").field("context", &self.context).finish()
    }
}

impl Span {
    pub(crate) fn new(
        context: SpanContext,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn SpanReporter>,
    ) -> Self {
        Self {
            context,
            state: Arc::new(Mutex::new(SpanState::default())),
            clock,
            reporter,
        }
    }

    fn state(&self) -> MutexGuard<'_, SpanState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn context(&self) -> SpanContext {
        self.context
    }

    pub fn name(&self, name: &str) -> &Self {
        self.state().name = shorten(name);
        self
    }

    pub fn current_name(&self) -> String {
        self.state().name.clone()
    }

    pub fn kind(&self, kind: SpanKind) -> &Self {
        self.state().kind = Some(kind);
        self
    }

    pub fn tag(&self, key: impl Into<String>, value: impl Into<String>) -> &Self {
        self.state().tags.insert(key.into(), value.into());
        self
    }

    /// Mark the span as failed. The last error wins.
    pub fn error(&self, message: impl Into<String>) -> &Self {
        self.state().error = Some(message.into());
        self
    }

    pub fn is_errored(&self) -> bool {
        self.state().error.is_some()
    }

    /// Record the start time. Starting twice keeps the first timestamp.
    pub fn start(&self) -> &Self {
        let mut state = self.state();
        if state.started.is_none() {
            state.started = Some((self.clock.now(), self.clock.epoch_micros()));
        }
        self
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Finish the span and report it if sampled.
    ///
    /// Returns `false` if the span had already ended.
    pub fn end(&self) -> bool {
        let finished = {
            let mut state = self.state();
            if state.finished {
                return false;
            }
            state.finished = true;

            let (started_at, timestamp) = state
                .started
                .unwrap_or_else(|| (self.clock.now(), self.clock.epoch_micros()));
            let duration = self.clock.now().saturating_duration_since(started_at);

            let mut tags = std::mem::take(&mut state.tags);
            if let Some(error) = state.error.take() {
                tags.insert("error".to_string(), error);
            }

            FinishedSpan {
                trace_id: self.context.trace_id,
                id: self.context.span_id,
                parent_id: self.context.parent_id,
                name: std::mem::take(&mut state.name),
                kind: state.kind,
                timestamp,
                duration: duration.as_micros() as u64,
                tags,
            }
        };

        if self.context.sampled {
            self.reporter.report(finished);
        }
        true
    }
}

/// Convert a camelCase or PascalCase name to lower-hyphen form.
///
/// `fetchUserData` becomes `fetch-user-data`.
pub fn to_lower_hyphen(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_uppercase() {
            if !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Truncate a span name to `MAX_SPAN_NAME_LENGTH` characters.
pub fn shorten(name: &str) -> String {
    name.chars().take(MAX_SPAN_NAME_LENGTH).collect()
}
