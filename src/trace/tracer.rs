//! Span factory.
//!
//! # Responsibilities
//! - Generate trace and span ids
//! - Link new spans to the ambient parent, or start a new trace
//! - Take the sampling decision at the root; children inherit it
//! - Push spans as the ambient current span (`with_span`)

use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;
use crate::trace::current::{self, Scope};
use crate::trace::reporter::SpanReporter;
use crate::trace::sampler::SharedSampler;
use crate::trace::span::{Span, SpanContext};

/// Creates spans and manages the ambient span.
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

struct TracerInner {
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn SpanReporter>,
    sampler: SharedSampler,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("sampler", &self.inner.sampler.load())
            .finish()
    }
}

fn next_id() -> u64 {
    loop {
        let id: u64 = rand::random();
        if id != 0 {
            return id;
        }
    }
}

impl Tracer {
    pub fn new(
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn SpanReporter>,
        sampler: SharedSampler,
    ) -> Self {
        Self {
            inner: Arc::new(TracerInner {
                clock,
                reporter,
                sampler,
            }),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn sampler(&self) -> &SharedSampler {
        &self.inner.sampler
    }

    /// The span current on this thread.
    pub fn current_context(&self) -> Option<SpanContext> {
        current::current()
    }

    /// Child of the current span, or a new trace if there is none.
    pub fn next_span(&self) -> Span {
        match self.current_context() {
            Some(parent) => self.child_of(&parent),
            None => self.new_trace(),
        }
    }

    /// Root span of a new trace.
    pub fn new_trace(&self) -> Span {
        let trace_id = (u128::from(next_id()) << 64) | u128::from(next_id());
        let sampled = self.inner.sampler.load().is_sampled(trace_id);
        self.span(SpanContext {
            trace_id,
            span_id: next_id(),
            parent_id: None,
            sampled,
        })
    }

    /// Child span in the parent's trace.
    pub fn child_of(&self, parent: &SpanContext) -> Span {
        self.span(SpanContext {
            trace_id: parent.trace_id,
            span_id: next_id(),
            parent_id: Some(parent.span_id),
            sampled: parent.sampled,
        })
    }

    /// Make `context` the current span on this thread.
    pub fn with_span(&self, context: &SpanContext) -> Scope {
        current::open(*context)
    }

    fn span(&self, context: SpanContext) -> Span {
        Span::new(context, self.inner.clock.clone(), self.inner.reporter.clone())
    }
}
