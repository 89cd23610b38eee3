//! Composite listeners: many listeners presented as one.
//!
//! # Policies
//! - All-matching: every child whose `supports` accepts the recording runs,
//!   in registration order
//! - First-matching: only the first such child runs; used when exactly one
//!   bridge must own an event
//!
//! # Design Decisions
//! - Children are flattened at construction: a nested composite with the same
//!   policy contributes its children instead of itself
//! - Deduplication by `Arc` identity, first registration wins
//! - A nested composite with a different policy stays opaque, since flattening
//!   it would change which of its children run
//! - The composite itself supports every recording; filtering is per child

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::listener::{identity, invoke, Hook, ListenerError, RecordingListener};
use crate::recorder::Recording;

/// Dispatch policy of a composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    AllMatching,
    FirstMatching,
}

/// Aggregates listeners and fans events out to them.
pub struct CompositeRecordingListener {
    name: String,
    policy: MatchPolicy,
    listeners: Vec<Arc<dyn RecordingListener>>,
}

impl fmt::Debug for CompositeRecordingListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("CompositeRecordingListener")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("listeners", &names)
            .finish()
    }
}

impl CompositeRecordingListener {
    /// Build a composite, flattening and deduplicating `listeners`.
    pub fn new<I>(policy: MatchPolicy, listeners: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RecordingListener>>,
    {
        let mut flat = Vec::new();
        let mut seen = HashSet::new();
        for listener in listeners {
            flatten_into(policy, listener, &mut flat, &mut seen);
        }

        let name = match policy {
            MatchPolicy::AllMatching => "composite.all",
            MatchPolicy::FirstMatching => "composite.first",
        };

        Self {
            name: name.to_string(),
            policy,
            listeners: flat,
        }
    }

    pub fn all_matching<I>(listeners: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RecordingListener>>,
    {
        Self::new(MatchPolicy::AllMatching, listeners)
    }

    pub fn first_matching<I>(listeners: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn RecordingListener>>,
    {
        Self::new(MatchPolicy::FirstMatching, listeners)
    }

    /// Override the name used in logs and metric labels.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Flattened, deduplicated children in registration order.
    pub fn listeners(&self) -> &[Arc<dyn RecordingListener>] {
        &self.listeners
    }

    fn fan_out(&self, hook: Hook, recording: &Recording) {
        let mut matching = self.listeners.iter().filter(|l| l.supports(recording));
        match self.policy {
            MatchPolicy::AllMatching => {
                for listener in matching {
                    invoke(listener.as_ref(), hook, recording);
                }
            }
            MatchPolicy::FirstMatching => {
                if let Some(listener) = matching.next() {
                    invoke(listener.as_ref(), hook, recording);
                }
            }
        }
    }
}

fn flatten_into(
    policy: MatchPolicy,
    listener: Arc<dyn RecordingListener>,
    out: &mut Vec<Arc<dyn RecordingListener>>,
    seen: &mut HashSet<usize>,
) {
    if let Some(nested) = listener.as_composite() {
        if nested.policy() == policy {
            // Already flat: its own constructor flattened it.
            for child in nested.listeners() {
                if seen.insert(identity(child)) {
                    out.push(child.clone());
                }
            }
            return;
        }
    }

    if seen.insert(identity(&listener)) {
        out.push(listener);
    }
}

impl RecordingListener for CompositeRecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _recording: &Recording) -> bool {
        true
    }

    fn on_start(&self, recording: &Recording) -> Result<(), ListenerError> {
        self.fan_out(Hook::Start, recording);
        Ok(())
    }

    fn on_stop(&self, recording: &Recording) -> Result<(), ListenerError> {
        self.fan_out(Hook::Stop, recording);
        Ok(())
    }

    fn on_error(&self, recording: &Recording) -> Result<(), ListenerError> {
        self.fan_out(Hook::Error, recording);
        Ok(())
    }

    fn on_restore(&self, recording: &Recording) -> Result<(), ListenerError> {
        self.fan_out(Hook::Restore, recording);
        Ok(())
    }

    fn on_detach(&self, recording: &Recording) -> Result<(), ListenerError> {
        self.fan_out(Hook::Detach, recording);
        Ok(())
    }

    fn as_composite(&self) -> Option<&CompositeRecordingListener> {
        Some(self)
    }
}
