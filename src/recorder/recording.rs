//! The recording handle passed through the listener chain.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use crate::clock::Clock;

/// Request method tag on HTTP recordings.
pub const HTTP_METHOD: &str = "http.method";
/// Request path tag on HTTP recordings.
pub const HTTP_PATH: &str = "http.path";
/// Response status tag on HTTP recordings.
pub const HTTP_STATUS_CODE: &str = "http.status_code";

/// Identity of a recording, unique within one `Recorder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordingId(pub u64);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec-{}", self.0)
    }
}

/// What kind of operation is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingKind {
    Generic,
    HttpClient,
    HttpServer,
}

impl RecordingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingKind::Generic => "generic",
            RecordingKind::HttpClient => "http_client",
            RecordingKind::HttpServer => "http_server",
        }
    }
}

/// Failure attached to a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// Short type name of the cause, e.g. `Error` for `std::io::Error`.
    pub kind: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture an error value, naming it after its type.
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);
        Self::new(short, error.to_string())
    }
}

/// One observed operation.
///
/// Owned by the caller between `Recorder::start` and `Recorder::stop`;
/// listeners only ever see it by reference.
#[derive(Debug, Clone)]
pub struct Recording {
    id: RecordingId,
    name: String,
    kind: RecordingKind,
    started_at: Instant,
    start_wall: SystemTime,
    tags: BTreeMap<String, String>,
    duration: Option<Duration>,
    error: Option<ErrorInfo>,
    noop: bool,
}

impl Recording {
    pub fn new(
        id: RecordingId,
        name: impl Into<String>,
        kind: RecordingKind,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            started_at: clock.now(),
            start_wall: clock.wall_time(),
            tags: BTreeMap::new(),
            duration: None,
            error: None,
            noop: false,
        }
    }

    pub fn id(&self) -> RecordingId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RecordingKind {
        self.kind
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn start_wall(&self) -> SystemTime {
        self.start_wall
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Add or replace a tag. Tags added before `stop` reach every listener.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set once the recording has stopped.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    /// Vetoed recordings are never dispatched to listeners.
    pub fn is_noop(&self) -> bool {
        self.noop
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    pub(crate) fn set_error(&mut self, error: ErrorInfo) {
        self.error = Some(error);
    }

    pub(crate) fn mark_noop(&mut self) {
        self.noop = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_error_info_uses_short_type_name() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let info = ErrorInfo::from_error(&err);
        assert_eq!(info.kind, "Error");
        assert_eq!(info.message, "disk gone");
    }

    #[test]
    fn test_tags_are_ordered_and_replaceable() {
        let clock = ManualClock::new();
        let mut rec = Recording::new(RecordingId(3), "op", RecordingKind::Generic, &clock);
        rec.tag("b", "1").tag("a", "2").tag("b", "3");

        let keys: Vec<&str> = rec.tags().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(rec.tag_value("b"), Some("3"));
        assert_eq!(rec.started_at(), clock.now());
    }

    #[test]
    fn test_id_display() {
        assert_eq!(RecordingId(42).to_string(), "rec-42");
    }
}
