//! Timer metrics for recordings.
//!
//! # Metrics (per recording name)
//! - `{name}.active` (gauge): recordings started and not yet stopped
//! - `{name}` (timer): duration, tagged with the recording's tags plus
//!   `outcome` and `error`
//! - `{name}.errors` (counter): errors attached before stop

use std::sync::Arc;

use crate::listener::{ListenerError, RecordingListener};
use crate::recorder::Recording;
use crate::sink::MetricsSink;

/// Feeds recording lifecycles into a `MetricsSink`.
pub struct MetricsRecordingListener {
    sink: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for MetricsRecordingListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecordingListener").finish_non_exhaustive()
    }
}

impl MetricsRecordingListener {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    fn error_tag(recording: &Recording) -> (String, String) {
        let kind = recording
            .error()
            .map(|e| e.kind.clone())
            .unwrap_or_else(|| "none".to_string());
        ("error".to_string(), kind)
    }
}

impl RecordingListener for MetricsRecordingListener {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_start(&self, recording: &Recording) -> Result<(), ListenerError> {
        self.sink
            .adjust_gauge(&format!("{}.active", recording.name()), &[], 1.0)?;
        Ok(())
    }

    fn on_error(&self, recording: &Recording) -> Result<(), ListenerError> {
        let tags = vec![Self::error_tag(recording)];
        self.sink
            .increment_counter(&format!("{}.errors", recording.name()), &tags)?;
        Ok(())
    }

    fn on_stop(&self, recording: &Recording) -> Result<(), ListenerError> {
        // Release the gauge first so a rejected timer cannot leave it raised.
        self.sink
            .adjust_gauge(&format!("{}.active", recording.name()), &[], -1.0)?;

        let outcome = if recording.error().is_some() { "error" } else { "success" };
        let mut tags: Vec<(String, String)> = recording
            .tags()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        tags.push(("outcome".to_string(), outcome.to_string()));
        tags.push(Self::error_tag(recording));

        let duration = recording.duration().unwrap_or_default();
        self.sink.record_timer(recording.name(), &tags, duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::recorder::{ErrorInfo, RecordingId, RecordingKind};
    use crate::sink::InMemorySink;
    use std::time::Duration;

    fn tag<'a>(tags: &'a [(String, String)], key: &str) -> Option<&'a str> {
        tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_success_timer_and_gauge() {
        let sink = Arc::new(InMemorySink::new());
        let listener = MetricsRecordingListener::new(sink.clone());
        let mut rec = Recording::new(RecordingId(1), "checkout", RecordingKind::Generic, &SystemClock);
        rec.tag("region", "eu");

        listener.on_start(&rec).unwrap();
        assert_eq!(sink.gauge("checkout.active"), 1.0);

        rec.set_duration(Duration::from_millis(40));
        listener.on_stop(&rec).unwrap();
        assert_eq!(sink.gauge("checkout.active"), 0.0);

        let timers = sink.timers("checkout");
        assert_eq!(timers.len(), 1);
        let (tags, duration) = &timers[0];
        assert_eq!(*duration, Duration::from_millis(40));
        assert_eq!(tag(tags, "region"), Some("eu"));
        assert_eq!(tag(tags, "outcome"), Some("success"));
        assert_eq!(tag(tags, "error"), Some("none"));
    }

    #[test]
    fn test_error_counts_and_tags_timer() {
        let sink = Arc::new(InMemorySink::new());
        let listener = MetricsRecordingListener::new(sink.clone());
        let mut rec = Recording::new(RecordingId(1), "checkout", RecordingKind::Generic, &SystemClock);

        listener.on_start(&rec).unwrap();
        rec.set_error(ErrorInfo::new("Timeout", "too slow"));
        listener.on_error(&rec).unwrap();
        rec.set_duration(Duration::from_millis(1));
        listener.on_stop(&rec).unwrap();

        assert_eq!(sink.counter("checkout.errors"), 1);
        let (tags, _) = &sink.timers("checkout")[0];
        assert_eq!(tag(tags, "outcome"), Some("error"));
        assert_eq!(tag(tags, "error"), Some("Timeout"));
    }
}
