//! Metrics sinks for recording timers.
//!
//! # Responsibilities
//! - Accept named, tagged timer samples, counters, and gauge deltas
//! - Enforce tag cardinality limits before samples reach the backend
//!
//! # Design Decisions
//! - Cardinality is the sink's concern, not the listener's
//! - Past the limit new tag values are denied silently; the first denial per
//!   metric is logged once, later ones are not

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

/// Errors raised by metrics sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Backend refused the sample.
    #[error("Metrics backend unavailable: {0}")]
    Unavailable(String),
}

/// Destination for recording metrics.
pub trait MetricsSink: Send + Sync {
    fn record_timer(
        &self,
        name: &str,
        tags: &[(String, String)],
        duration: Duration,
    ) -> Result<(), SinkError>;

    fn increment_counter(&self, name: &str, tags: &[(String, String)]) -> Result<(), SinkError>;

    fn adjust_gauge(&self, name: &str, tags: &[(String, String)], delta: f64) -> Result<(), SinkError>;
}

/// Caps the number of distinct values per (metric, tag key).
pub struct CardinalityLimitedSink<S> {
    inner: S,
    max_values: usize,
    seen: DashMap<(String, String), HashSet<String>>,
    warned: DashMap<String, ()>,
}

impl<S: MetricsSink> CardinalityLimitedSink<S> {
    pub fn new(inner: S, max_values: usize) -> Self {
        Self {
            inner,
            max_values,
            seen: DashMap::new(),
            warned: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Admit the sample only if every tag value fits under the limit.
    ///
    /// Values are checked for all keys first and recorded only once the
    /// whole sample is admitted, so a denied sample uses no budget.
    fn admit(&self, name: &str, tags: &[(String, String)]) -> bool {
        let mut fresh = Vec::new();
        for (key, value) in tags {
            let slot = (name.to_string(), key.clone());
            let full = match self.seen.get(&slot) {
                Some(values) if values.contains(value) => continue,
                Some(values) => values.len() >= self.max_values,
                None => self.max_values == 0,
            };
            if full {
                if self.warned.insert(name.to_string(), ()).is_none() {
                    tracing::warn!(
                        metric = name,
                        tag = %key,
                        max_values = self.max_values,
                        "Reached the maximum number of '{}' tags for '{}'",
                        key,
                        name
                    );
                }
                return false;
            }
            fresh.push((slot, value));
        }

        for (slot, value) in fresh {
            self.seen.entry(slot).or_default().insert(value.clone());
        }
        true
    }
}

impl<S: MetricsSink> MetricsSink for CardinalityLimitedSink<S> {
    fn record_timer(
        &self,
        name: &str,
        tags: &[(String, String)],
        duration: Duration,
    ) -> Result<(), SinkError> {
        if !self.admit(name, tags) {
            return Ok(());
        }
        self.inner.record_timer(name, tags, duration)
    }

    fn increment_counter(&self, name: &str, tags: &[(String, String)]) -> Result<(), SinkError> {
        if !self.admit(name, tags) {
            return Ok(());
        }
        self.inner.increment_counter(name, tags)
    }

    fn adjust_gauge(&self, name: &str, tags: &[(String, String)], delta: f64) -> Result<(), SinkError> {
        if !self.admit(name, tags) {
            return Ok(());
        }
        self.inner.adjust_gauge(name, tags, delta)
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<S> {
    fn record_timer(
        &self,
        name: &str,
        tags: &[(String, String)],
        duration: Duration,
    ) -> Result<(), SinkError> {
        (**self).record_timer(name, tags, duration)
    }

    fn increment_counter(&self, name: &str, tags: &[(String, String)]) -> Result<(), SinkError> {
        (**self).increment_counter(name, tags)
    }

    fn adjust_gauge(&self, name: &str, tags: &[(String, String)], delta: f64) -> Result<(), SinkError> {
        (**self).adjust_gauge(name, tags, delta)
    }
}

/// One sample captured by `InMemorySink`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Timer { name: String, tags: Vec<(String, String)>, duration: Duration },
    Counter { name: String, tags: Vec<(String, String)> },
    Gauge { name: String, tags: Vec<(String, String)>, delta: f64 },
}

/// Captures every sample in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    events: Mutex<Vec<MetricEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Timer samples recorded under `name`.
    pub fn timers(&self, name: &str) -> Vec<(Vec<(String, String)>, Duration)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MetricEvent::Timer { name: n, tags, duration } if n == name => Some((tags, duration)),
                _ => None,
            })
            .collect()
    }

    /// Number of increments recorded under `name`.
    pub fn counter(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MetricEvent::Counter { name: n, .. } if n == name))
            .count()
    }

    /// Net gauge value under `name`.
    pub fn gauge(&self, name: &str) -> f64 {
        self.events()
            .iter()
            .filter_map(|e| match e {
                MetricEvent::Gauge { name: n, delta, .. } if n == name => Some(*delta),
                _ => None,
            })
            .sum()
    }

    fn push(&self, event: MetricEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl MetricsSink for InMemorySink {
    fn record_timer(
        &self,
        name: &str,
        tags: &[(String, String)],
        duration: Duration,
    ) -> Result<(), SinkError> {
        self.push(MetricEvent::Timer {
            name: name.to_string(),
            tags: tags.to_vec(),
            duration,
        });
        Ok(())
    }

    fn increment_counter(&self, name: &str, tags: &[(String, String)]) -> Result<(), SinkError> {
        self.push(MetricEvent::Counter {
            name: name.to_string(),
            tags: tags.to_vec(),
        });
        Ok(())
    }

    fn adjust_gauge(&self, name: &str, tags: &[(String, String)], delta: f64) -> Result<(), SinkError> {
        self.push(MetricEvent::Gauge {
            name: name.to_string(),
            tags: tags.to_vec(),
            delta,
        });
        Ok(())
    }
}
