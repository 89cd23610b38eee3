//! Per-recording tracing state.
//!
//! # Responsibilities
//! - Hold the span and at most one open scope for each in-flight recording
//! - Create entries on demand, evict them once the span has ended
//! - Optionally sweep entries whose recording was never stopped
//!
//! # Design Decisions
//! - One shared `DashMap` keyed by `RecordingId`; calls for different
//!   recordings never contend on a global lock
//! - Setting a new scope closes the one it replaces, so at most one scope per
//!   recording is ever open
//! - The in-flight count is kept in an atomic beside the map, so reading it
//!   never visits every shard

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;

use crate::recorder::RecordingId;
use crate::trace::{Scope, Span};

/// Span and scope associated with one recording.
#[derive(Debug, Default)]
pub struct TracingContext {
    span: Option<Span>,
    scope: Option<Scope>,
    opened_at: Option<Instant>,
}

impl TracingContext {
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// When the span was attached, used by the abandoned sweep.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    pub fn set_span_and_scope(&mut self, span: Span, scope: Scope, now: Instant) {
        self.span = Some(span);
        self.set_scope(scope);
        self.opened_at = Some(now);
    }

    /// Replace the scope, closing the previous one first.
    pub fn set_scope(&mut self, scope: Scope) {
        self.close_scope();
        self.scope = Some(scope);
    }

    /// Close and drop the scope. Returns `true` if a still-open scope was closed.
    pub fn close_scope(&mut self) -> bool {
        match self.scope.take() {
            Some(scope) => scope.close(),
            None => false,
        }
    }

    pub(crate) fn take_span(&mut self) -> Option<Span> {
        self.span.take()
    }
}

/// Concurrent store of tracing contexts keyed by recording.
#[derive(Debug, Default)]
pub struct TracingContextStore {
    entries: DashMap<RecordingId, TracingContext>,
    in_flight: AtomicUsize,
}

impl TracingContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `id`, created empty if absent.
    ///
    /// The returned guard locks the entry's shard; drop it before calling
    /// back into the store.
    pub fn get(&self, id: RecordingId) -> RefMut<'_, RecordingId, TracingContext> {
        match self.entries.entry(id) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => {
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                entry.insert(TracingContext::default())
            }
        }
    }

    /// Existing entry for `id`, without creating one.
    pub fn find(&self, id: RecordingId) -> Option<RefMut<'_, RecordingId, TracingContext>> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&self, id: RecordingId) -> Option<TracingContext> {
        let (_, ctx) = self.entries.remove(&id)?;
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        Some(ctx)
    }

    pub fn contains(&self, id: RecordingId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Exact entry count. Locks every shard in turn; prefer `in_flight` on
    /// hot paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries created and not yet removed, read without locking.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End and evict every entry attached more than `max_age` before `now`.
    ///
    /// Swept spans carry an `abandoned` tag. Returns the number evicted.
    pub fn sweep_older_than(&self, max_age: Duration, now: Instant) -> usize {
        let expired: Vec<RecordingId> = self
            .entries
            .iter()
            .filter(|entry| {
                entry
                    .opened_at
                    .is_some_and(|at| now.saturating_duration_since(at) > max_age)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut swept = 0;
        for id in expired {
            if let Some(mut ctx) = self.remove(id) {
                ctx.close_scope();
                if let Some(span) = ctx.take_span() {
                    span.tag("abandoned", "true");
                    span.end();
                }
                tracing::warn!(recording_id = %id, "Evicted abandoned recording");
                swept += 1;
            }
        }
        swept
    }
}
