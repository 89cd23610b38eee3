//! HTTP span naming and tagging.
//!
//! HTTP-flavored tracing listeners delegate to an `HttpHandler` for what is
//! protocol specific: the span name, request tags, and response tags.

use crate::recorder::{Recording, HTTP_METHOD, HTTP_PATH, HTTP_STATUS_CODE};
use crate::trace::Span;

/// Names and tags spans of HTTP recordings.
pub trait HttpHandler: Send + Sync {
    fn span_name(&self, recording: &Recording) -> String;

    /// Called once the span has started.
    fn on_request(&self, recording: &Recording, span: &Span);

    /// Called just before the span ends.
    fn on_response(&self, recording: &Recording, span: &Span);
}

/// Method-named spans with method, path, and status tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHttpHandler;

impl HttpHandler for DefaultHttpHandler {
    fn span_name(&self, recording: &Recording) -> String {
        recording
            .tag_value(HTTP_METHOD)
            .map(str::to_lowercase)
            .unwrap_or_else(|| "http".to_string())
    }

    fn on_request(&self, recording: &Recording, span: &Span) {
        for key in [HTTP_METHOD, HTTP_PATH] {
            if let Some(value) = recording.tag_value(key) {
                span.tag(key, value);
            }
        }
    }

    fn on_response(&self, recording: &Recording, span: &Span) {
        let Some(status) = recording.tag_value(HTTP_STATUS_CODE) else {
            return;
        };
        span.tag(HTTP_STATUS_CODE, status);

        match status.parse::<u16>() {
            Ok(code) if (100..400).contains(&code) => {}
            _ => {
                if !span.is_errored() {
                    span.error(status);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::recorder::{RecordingId, RecordingKind};
    use crate::trace::{sampler, InMemoryReporter, Sampler, Tracer};
    use std::sync::Arc;

    fn request(method: &str, status: Option<&str>) -> Recording {
        let mut rec = Recording::new(RecordingId(9), "http", RecordingKind::HttpServer, &SystemClock);
        rec.tag(HTTP_METHOD, method).tag(HTTP_PATH, "/users/7");
        if let Some(status) = status {
            rec.tag(HTTP_STATUS_CODE, status);
        }
        rec
    }

    fn finish(rec: &Recording) -> crate::trace::FinishedSpan {
        let reporter = Arc::new(InMemoryReporter::new());
        let tracer = Tracer::new(Arc::new(SystemClock), reporter.clone(), sampler::shared(Sampler::Always));
        let span = tracer.new_trace();
        let handler = DefaultHttpHandler;

        span.name(&handler.span_name(rec)).start();
        handler.on_request(rec, &span);
        handler.on_response(rec, &span);
        span.end();
        reporter.spans().remove(0)
    }

    #[test]
    fn test_names_span_after_method() {
        let span = finish(&request("GET", Some("200")));
        assert_eq!(span.name, "get");
        assert_eq!(span.tags.get(HTTP_PATH).map(String::as_str), Some("/users/7"));
        assert!(!span.tags.contains_key("error"));
    }

    #[test]
    fn test_error_status_marks_span() {
        let span = finish(&request("POST", Some("503")));
        assert_eq!(span.tags.get("error").map(String::as_str), Some("503"));
        assert_eq!(span.tags.get(HTTP_STATUS_CODE).map(String::as_str), Some("503"));
    }

    #[test]
    fn test_informational_below_range_is_error() {
        let span = finish(&request("GET", Some("42")));
        assert!(span.tags.contains_key("error"));
    }

    #[test]
    fn test_missing_status_leaves_span_clean() {
        let span = finish(&request("DELETE", None));
        assert!(!span.tags.contains_key(HTTP_STATUS_CODE));
        assert!(!span.tags.contains_key("error"));
    }
}
