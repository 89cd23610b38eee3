//! Bridges recordings onto spans.
//!
//! # Responsibilities
//! - Open a span when a recording starts, child of the ambient span if any
//! - Keep the span current on the recording's thread through a scope
//! - Record errors, apply tags, release the scope, and end the span on stop
//!
//! # Data Flow
//! ```text
//! on_start:   Tracer::next_span → name → start → with_span → store.get(id)
//! on_restore: store.find(id) → close old scope → with_span → set_scope
//! on_error:   store.find(id) → span.error
//! on_detach:  store.find(id) → close scope (span stays open)
//! on_stop:    store.remove(id) → tags → close scope → span.end
//! ```
//!
//! # Design Decisions
//! - Flavors are variants of one listener, told apart by `supports`
//! - A missing context at stop or restore is a logged no-op
//! - The scope is always closed before the span ends

use std::fmt;
use std::sync::Arc;

use crate::listener::http::HttpHandler;
use crate::listener::tracing_context::TracingContextStore;
use crate::listener::{ListenerError, RecordingListener};
use crate::observability::metrics;
use crate::recorder::{Recording, RecordingKind};
use crate::trace::span::to_lower_hyphen;
use crate::trace::{Span, SpanKind, Tracer};

/// Which recordings a tracing listener handles, and how it names spans.
#[derive(Clone)]
pub enum TracingFlavor {
    /// Every recording; span named after the recording in lower-hyphen form.
    Default,
    /// HTTP client recordings only.
    HttpClient(Arc<dyn HttpHandler>),
    /// HTTP server recordings only.
    HttpServer(Arc<dyn HttpHandler>),
}

impl fmt::Debug for TracingFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TracingFlavor::Default => "Default",
            TracingFlavor::HttpClient(_) => "HttpClient",
            TracingFlavor::HttpServer(_) => "HttpServer",
        })
    }
}

impl TracingFlavor {
    fn handler(&self) -> Option<&Arc<dyn HttpHandler>> {
        match self {
            TracingFlavor::Default => None,
            TracingFlavor::HttpClient(h) | TracingFlavor::HttpServer(h) => Some(h),
        }
    }

    fn span_kind(&self) -> Option<SpanKind> {
        match self {
            TracingFlavor::Default => None,
            TracingFlavor::HttpClient(_) => Some(SpanKind::Client),
            TracingFlavor::HttpServer(_) => Some(SpanKind::Server),
        }
    }
}

/// Opens, scopes, and ends spans for recordings.
#[derive(Debug)]
pub struct TracingRecordingListener {
    name: &'static str,
    tracer: Tracer,
    contexts: Arc<TracingContextStore>,
    flavor: TracingFlavor,
}

impl TracingRecordingListener {
    pub fn new(tracer: Tracer, contexts: Arc<TracingContextStore>) -> Self {
        Self::with_flavor(tracer, contexts, TracingFlavor::Default)
    }

    pub fn http_client(
        tracer: Tracer,
        contexts: Arc<TracingContextStore>,
        handler: Arc<dyn HttpHandler>,
    ) -> Self {
        Self::with_flavor(tracer, contexts, TracingFlavor::HttpClient(handler))
    }

    pub fn http_server(
        tracer: Tracer,
        contexts: Arc<TracingContextStore>,
        handler: Arc<dyn HttpHandler>,
    ) -> Self {
        Self::with_flavor(tracer, contexts, TracingFlavor::HttpServer(handler))
    }

    pub fn with_flavor(
        tracer: Tracer,
        contexts: Arc<TracingContextStore>,
        flavor: TracingFlavor,
    ) -> Self {
        let name = match flavor {
            TracingFlavor::Default => "tracing",
            TracingFlavor::HttpClient(_) => "tracing.http_client",
            TracingFlavor::HttpServer(_) => "tracing.http_server",
        };
        Self {
            name,
            tracer,
            contexts,
            flavor,
        }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn contexts(&self) -> &Arc<TracingContextStore> {
        &self.contexts
    }

    pub fn flavor(&self) -> &TracingFlavor {
        &self.flavor
    }

    /// Close the recording's scope on this thread but keep its span.
    ///
    /// Used before the recording hops to another thread, where `on_restore`
    /// re-opens a scope. Returns `true` if an open scope was closed.
    pub fn detach(&self, recording: &Recording) -> bool {
        match self.contexts.find(recording.id()) {
            Some(mut ctx) => ctx.close_scope(),
            None => false,
        }
    }

    fn span_name(&self, recording: &Recording) -> String {
        match self.flavor.handler() {
            Some(handler) => handler.span_name(recording),
            None => to_lower_hyphen(recording.name()),
        }
    }

    fn missing(&self, recording: &Recording, hook: &'static str) {
        tracing::debug!(
            listener = self.name,
            recording_id = %recording.id(),
            hook,
            "No tracing context for recording"
        );
        metrics::record_missing_context(hook);
    }

    fn apply_tags(&self, recording: &Recording, span: &Span) {
        for (key, value) in recording.tags() {
            span.tag(key.as_str(), value.as_str());
        }
        if let Some(handler) = self.flavor.handler() {
            handler.on_response(recording, span);
        }
    }
}

impl RecordingListener for TracingRecordingListener {
    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, recording: &Recording) -> bool {
        match self.flavor {
            TracingFlavor::Default => true,
            TracingFlavor::HttpClient(_) => recording.kind() == RecordingKind::HttpClient,
            TracingFlavor::HttpServer(_) => recording.kind() == RecordingKind::HttpServer,
        }
    }

    fn on_start(&self, recording: &Recording) -> Result<(), ListenerError> {
        if self.contexts.find(recording.id()).is_some_and(|ctx| ctx.span().is_some()) {
            tracing::warn!(
                listener = self.name,
                recording_id = %recording.id(),
                "Recording already has a span, start ignored"
            );
            return Ok(());
        }

        let span = self.tracer.next_span();
        span.name(&self.span_name(recording));
        if let Some(kind) = self.flavor.span_kind() {
            span.kind(kind);
        }
        span.start();
        if let Some(handler) = self.flavor.handler() {
            handler.on_request(recording, &span);
        }

        let scope = self.tracer.with_span(&span.context());
        tracing::trace!(
            listener = self.name,
            recording_id = %recording.id(),
            span = %span.context(),
            "Span opened"
        );

        let now = self.tracer.clock().now();
        self.contexts
            .get(recording.id())
            .set_span_and_scope(span, scope, now);
        metrics::record_contexts_in_flight(self.contexts.in_flight());
        Ok(())
    }

    fn on_restore(&self, recording: &Recording) -> Result<(), ListenerError> {
        let Some(mut ctx) = self.contexts.find(recording.id()) else {
            self.missing(recording, "restore");
            return Ok(());
        };
        let Some(span_context) = ctx.span().map(Span::context) else {
            drop(ctx);
            self.missing(recording, "restore");
            return Ok(());
        };

        // The old scope must be gone before the new one captures what is current.
        ctx.close_scope();
        ctx.set_scope(self.tracer.with_span(&span_context));
        Ok(())
    }

    fn on_detach(&self, recording: &Recording) -> Result<(), ListenerError> {
        if !self.detach(recording) {
            tracing::trace!(
                listener = self.name,
                recording_id = %recording.id(),
                "Nothing to detach"
            );
        }
        Ok(())
    }

    fn on_error(&self, recording: &Recording) -> Result<(), ListenerError> {
        let Some(ctx) = self.contexts.find(recording.id()) else {
            self.missing(recording, "error");
            return Ok(());
        };
        if let (Some(span), Some(error)) = (ctx.span(), recording.error()) {
            span.error(error.message.as_str());
        }
        Ok(())
    }

    fn on_stop(&self, recording: &Recording) -> Result<(), ListenerError> {
        let Some(mut ctx) = self.contexts.remove(recording.id()) else {
            self.missing(recording, "stop");
            return Ok(());
        };
        metrics::record_contexts_in_flight(self.contexts.in_flight());

        let Some(span) = ctx.take_span() else {
            ctx.close_scope();
            self.missing(recording, "stop");
            return Ok(());
        };

        self.apply_tags(recording, &span);
        ctx.close_scope();
        span.end();
        tracing::trace!(
            listener = self.name,
            recording_id = %recording.id(),
            span = %span.context(),
            "Span ended"
        );
        Ok(())
    }
}
