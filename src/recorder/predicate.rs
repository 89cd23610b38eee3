//! Start-time vetoes for recordings.
//!
//! A predicate returning `false` turns the recording into a no-op: it is still
//! handed back to the caller, but no listener ever sees it.

use crate::recorder::recording::{Recording, RecordingKind, HTTP_PATH};

/// Decides whether a recording should be observed.
pub trait ObservationPredicate: Send + Sync {
    fn test(&self, name: &str, recording: &Recording) -> bool;
}

impl<F> ObservationPredicate for F
where
    F: Fn(&str, &Recording) -> bool + Send + Sync,
{
    fn test(&self, name: &str, recording: &Recording) -> bool {
        self(name, recording)
    }
}

/// Skips server recordings whose request path starts with an ignored prefix.
#[derive(Debug, Clone)]
pub struct IgnoredPathsPredicate {
    prefixes: Vec<String>,
}

impl IgnoredPathsPredicate {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl ObservationPredicate for IgnoredPathsPredicate {
    fn test(&self, _name: &str, recording: &Recording) -> bool {
        if recording.kind() != RecordingKind::HttpServer {
            return true;
        }
        match recording.tag_value(HTTP_PATH) {
            Some(path) => !self.prefixes.iter().any(|p| path.starts_with(p.as_str())),
            None => true,
        }
    }
}
