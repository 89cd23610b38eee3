//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use observation_pipeline::clock::{Clock, ManualClock};
use observation_pipeline::listener::{
    ListenerError, RecordingListener, TracingContextStore, TracingRecordingListener,
};
use observation_pipeline::recorder::{Recorder, Recording};
use observation_pipeline::trace::{sampler, InMemoryReporter, Sampler, Tracer};

/// Ordered log of hook invocations shared between witnesses.
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Journal::default()
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Listener that journals every hook as `name:hook`.
pub struct Witness {
    name: String,
    supports: bool,
    journal: Journal,
}

impl Witness {
    pub fn new(name: &str, supports: bool, journal: &Journal) -> Arc<dyn RecordingListener> {
        Arc::new(Self {
            name: name.to_string(),
            supports,
            journal: journal.clone(),
        })
    }

    fn log(&self, hook: &str) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.name, hook));
    }
}

impl RecordingListener for Witness {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _recording: &Recording) -> bool {
        self.supports
    }

    fn on_start(&self, _recording: &Recording) -> Result<(), ListenerError> {
        self.log("start");
        Ok(())
    }

    fn on_stop(&self, _recording: &Recording) -> Result<(), ListenerError> {
        self.log("stop");
        Ok(())
    }

    fn on_error(&self, _recording: &Recording) -> Result<(), ListenerError> {
        self.log("error");
        Ok(())
    }
}

/// Listener that panics on start and fails on stop.
pub struct Faulty;

impl RecordingListener for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn on_start(&self, _recording: &Recording) -> Result<(), ListenerError> {
        panic!("faulty listener");
    }

    fn on_stop(&self, _recording: &Recording) -> Result<(), ListenerError> {
        Err(ListenerError::Failed("faulty stop".into()))
    }
}

/// A recorder whose only listener is a default tracing listener.
pub struct TracingHarness {
    pub recorder: Recorder,
    pub listener: Arc<TracingRecordingListener>,
    pub reporter: Arc<InMemoryReporter>,
    pub clock: Arc<ManualClock>,
}

impl TracingHarness {
    pub fn new(sampler: Sampler) -> Self {
        let clock = Arc::new(ManualClock::new());
        let reporter = Arc::new(InMemoryReporter::new());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let tracer = Tracer::new(dyn_clock.clone(), reporter.clone(), sampler::shared(sampler));
        let listener = Arc::new(TracingRecordingListener::new(
            tracer,
            Arc::new(TracingContextStore::new()),
        ));
        let recorder = Recorder::new(listener.clone(), dyn_clock);

        Self {
            recorder,
            listener,
            reporter,
            clock,
        }
    }

    pub fn contexts(&self) -> &TracingContextStore {
        self.listener.contexts()
    }
}

pub fn no_tags() -> std::iter::Empty<(String, String)> {
    std::iter::empty()
}
