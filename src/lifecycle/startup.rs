//! Startup orchestration.
//!
//! # Responsibilities
//! - Assemble the listener chain from a validated `PipelineConfig`
//! - Check that every enabled listener has what it needs
//! - Start the optional abandoned-recording sweeper and the sampler reloader
//!
//! # Data Flow
//! ```text
//! PipelineConfig + PipelineDeps
//!     → sampler (from config unless supplied)
//!     → Tracer → tracing composite (first-matching):
//!           [http client?] [http server?] default
//!     → MetricsRecordingListener over CardinalityLimitedSink
//!     → root composite (all-matching)
//!     → Recorder (+ IgnoredPathsPredicate)
//! ```
//!
//! # Design Decisions
//! - Fail fast: a listener whose dependency is missing is a startup error,
//!   never a silently skipped listener
//! - The chain is built once; only the sampler changes afterwards

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::clock::{Clock, SystemClock};
use crate::config::{PipelineConfig, SamplerConfig};
use crate::listener::{
    CompositeRecordingListener, HttpHandler, MetricsRecordingListener, RecordingListener,
    TracingContextStore, TracingRecordingListener,
};
use crate::recorder::{IgnoredPathsPredicate, Recorder};
use crate::sink::{CardinalityLimitedSink, MetricsSink};
use crate::trace::sampler;
use crate::trace::{Sampler, SharedSampler, SpanReporter, Tracer};

/// Errors that abort pipeline assembly.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{flavor} tracing is enabled but no HTTP handler was provided")]
    MissingHttpHandler { flavor: &'static str },
}

/// Collaborators the pipeline cannot build from configuration alone.
pub struct PipelineDeps {
    pub clock: Arc<dyn Clock>,
    pub reporter: Arc<dyn SpanReporter>,
    pub sink: Arc<dyn MetricsSink>,
    /// Built from `[tracing.sampler]` when absent.
    pub sampler: Option<SharedSampler>,
    pub http_client_handler: Option<Arc<dyn HttpHandler>>,
    pub http_server_handler: Option<Arc<dyn HttpHandler>>,
}

impl PipelineDeps {
    pub fn new(reporter: Arc<dyn SpanReporter>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            reporter,
            sink,
            sampler: None,
            http_client_handler: None,
            http_server_handler: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sampler(mut self, sampler: SharedSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_http_client(mut self, handler: Arc<dyn HttpHandler>) -> Self {
        self.http_client_handler = Some(handler);
        self
    }

    pub fn with_http_server(mut self, handler: Arc<dyn HttpHandler>) -> Self {
        self.http_server_handler = Some(handler);
        self
    }
}

/// An assembled observation pipeline.
pub struct Pipeline {
    recorder: Arc<Recorder>,
    clock: Arc<dyn Clock>,
    sampler: SharedSampler,
    contexts: Arc<TracingContextStore>,
    abandoned_after: Option<Duration>,
}

impl Pipeline {
    /// Build the listener chain described by `config`.
    pub fn from_config(config: &PipelineConfig, deps: PipelineDeps) -> Result<Self, StartupError> {
        let sampler = deps.sampler.unwrap_or_else(|| {
            sampler::shared(Sampler::from_config(&config.tracing.sampler, deps.clock.clone()))
        });
        let contexts = Arc::new(TracingContextStore::new());
        let mut root: Vec<Arc<dyn RecordingListener>> = Vec::new();

        if config.tracing.enabled {
            let tracer = Tracer::new(deps.clock.clone(), deps.reporter.clone(), sampler.clone());
            let mut bridges: Vec<Arc<dyn RecordingListener>> = Vec::new();

            if config.tracing.http_client {
                let handler = deps
                    .http_client_handler
                    .ok_or(StartupError::MissingHttpHandler { flavor: "HTTP client" })?;
                bridges.push(Arc::new(TracingRecordingListener::http_client(
                    tracer.clone(),
                    contexts.clone(),
                    handler,
                )));
            }
            if config.tracing.http_server {
                let handler = deps
                    .http_server_handler
                    .ok_or(StartupError::MissingHttpHandler { flavor: "HTTP server" })?;
                bridges.push(Arc::new(TracingRecordingListener::http_server(
                    tracer.clone(),
                    contexts.clone(),
                    handler,
                )));
            }

            bridges.push(Arc::new(TracingRecordingListener::new(tracer, contexts.clone())));

            root.push(Arc::new(
                CompositeRecordingListener::first_matching(bridges).named("tracing"),
            ));
        }

        if config.metrics.enabled {
            let limited = CardinalityLimitedSink::new(deps.sink, config.metrics.max_tag_values);
            root.push(Arc::new(MetricsRecordingListener::new(Arc::new(limited))));
        }

        let root = Arc::new(CompositeRecordingListener::all_matching(root).named("root"));
        let mut recorder = Recorder::new(root, deps.clock.clone());
        if !config.observation.ignored_paths.is_empty() {
            recorder = recorder.with_predicate(IgnoredPathsPredicate::new(
                config.observation.ignored_paths.iter().cloned(),
            ));
        }

        tracing::info!(
            tracing = config.tracing.enabled,
            http_client = config.tracing.http_client,
            http_server = config.tracing.http_server,
            metrics = config.metrics.enabled,
            ignored_paths = config.observation.ignored_paths.len(),
            "Observation pipeline assembled"
        );

        Ok(Self {
            recorder: Arc::new(recorder),
            clock: deps.clock,
            sampler,
            contexts,
            abandoned_after: config.tracing.abandoned_after_secs.map(Duration::from_secs),
        })
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn contexts(&self) -> &Arc<TracingContextStore> {
        &self.contexts
    }

    pub fn sampler(&self) -> &SharedSampler {
        &self.sampler
    }

    /// Replace the sampler. Traces already started keep their decision.
    pub fn reload_sampler(&self, config: &SamplerConfig) {
        let next = Sampler::from_config(config, self.clock.clone());
        tracing::info!(sampler = ?next, "Sampler replaced");
        self.sampler.store(Arc::new(next));
    }

    /// Apply sampler updates from the config watcher until shutdown.
    pub fn spawn_reloader(
        self: &Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<SamplerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => match update {
                        Some(config) => pipeline.reload_sampler(&config),
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    /// Evict contexts older than the configured age and stop tracking their
    /// recordings. No-op when disabled.
    pub fn sweep_abandoned(&self) -> usize {
        match self.abandoned_after {
            Some(max_age) => sweep(&self.recorder, &self.contexts, max_age, self.clock.now()),
            None => 0,
        }
    }

    /// Run the sweep periodically until shutdown.
    ///
    /// Returns `None` when the sweep is disabled.
    pub fn spawn_sweeper(&self, mut shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        let max_age = self.abandoned_after?;
        let recorder = self.recorder.clone();
        let contexts = self.contexts.clone();
        let clock = self.clock.clone();
        let period = (max_age / 2).max(Duration::from_secs(1));

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let swept = sweep(&recorder, &contexts, max_age, clock.now());
                        if swept > 0 {
                            tracing::info!(swept, "Abandoned recordings evicted");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Abandoned-recording sweeper stopping");
                        break;
                    }
                }
            }
        }))
    }
}

fn sweep(
    recorder: &Recorder,
    contexts: &TracingContextStore,
    max_age: Duration,
    now: Instant,
) -> usize {
    let forgotten = recorder.forget_older_than(max_age, now);
    let swept = contexts.sweep_older_than(max_age, now);
    tracing::debug!(forgotten, swept, "Abandoned-recording sweep");
    swept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::listener::DefaultHttpHandler;
    use crate::sink::InMemorySink;
    use crate::trace::InMemoryReporter;

    fn deps() -> (PipelineDeps, Arc<InMemoryReporter>, Arc<InMemorySink>) {
        let reporter = Arc::new(InMemoryReporter::new());
        let sink = Arc::new(InMemorySink::new());
        let deps = PipelineDeps::new(reporter.clone(), sink.clone())
            .with_sampler(sampler::shared(Sampler::Always));
        (deps, reporter, sink)
    }

    fn no_tags() -> std::iter::Empty<(String, String)> {
        std::iter::empty()
    }

    #[test]
    fn test_missing_http_handler_is_fatal() {
        let mut config = PipelineConfig::default();
        config.tracing.http_server = true;
        let (deps, _, _) = deps();

        let err = Pipeline::from_config(&config, deps).err().unwrap();
        assert!(matches!(err, StartupError::MissingHttpHandler { flavor: "HTTP server" }));
    }

    #[test]
    fn test_default_pipeline_traces_and_times() {
        let (deps, reporter, sink) = deps();
        let pipeline = Pipeline::from_config(&PipelineConfig::default(), deps).unwrap();

        let mut rec = pipeline.recorder().start("loadOrders", no_tags());
        pipeline.recorder().stop(&mut rec);

        assert_eq!(reporter.spans()[0].name, "load-orders");
        assert_eq!(sink.timers("loadOrders").len(), 1);
        assert!(pipeline.contexts().is_empty());
    }

    #[test]
    fn test_tracing_disabled_reports_nothing() {
        let mut config = PipelineConfig::default();
        config.tracing.enabled = false;
        let (deps, reporter, sink) = deps();
        let pipeline = Pipeline::from_config(&config, deps).unwrap();

        let mut rec = pipeline.recorder().start("op", no_tags());
        pipeline.recorder().detach(&rec);
        pipeline.recorder().stop(&mut rec);

        assert!(reporter.spans().is_empty());
        assert_eq!(sink.timers("op").len(), 1);
    }

    #[test]
    fn test_http_server_with_handler() {
        let mut config = PipelineConfig::default();
        config.tracing.http_server = true;
        config.observation.ignored_paths = vec!["/health".to_string()];
        let (deps, reporter, _) = deps();
        let pipeline =
            Pipeline::from_config(&config, deps.with_http_server(Arc::new(DefaultHttpHandler)))
                .unwrap();

        let recorder = pipeline.recorder();
        let mut ignored = recorder.start_kind(
            crate::recorder::RecordingKind::HttpServer,
            "http",
            [("http.path", "/health/live"), ("http.method", "GET")],
        );
        recorder.stop(&mut ignored);

        let mut served = recorder.start_kind(
            crate::recorder::RecordingKind::HttpServer,
            "http",
            [("http.path", "/orders"), ("http.method", "GET")],
        );
        served.tag("http.status_code", "200");
        recorder.stop(&mut served);

        let spans = reporter.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "get");
    }

    #[test]
    fn test_reload_sampler_swaps() {
        let mut config = PipelineConfig::default();
        config.tracing.sampler.probability = Some(0.0);
        let reporter = Arc::new(InMemoryReporter::new());
        let deps = PipelineDeps::new(reporter.clone(), Arc::new(InMemorySink::new()));
        let pipeline = Pipeline::from_config(&config, deps).unwrap();

        let mut rec = pipeline.recorder().start("op", no_tags());
        pipeline.recorder().stop(&mut rec);
        assert!(reporter.spans().is_empty());

        pipeline.reload_sampler(&SamplerConfig { probability: Some(1.0), rate: 10 });
        let mut rec = pipeline.recorder().start("op", no_tags());
        pipeline.recorder().stop(&mut rec);
        assert_eq!(reporter.spans().len(), 1);
    }

    #[test]
    fn test_sweep_abandoned() {
        let mut config = PipelineConfig::default();
        config.tracing.abandoned_after_secs = Some(30);
        let clock = Arc::new(ManualClock::new());
        let (deps, reporter, _) = deps();
        let pipeline = Pipeline::from_config(&config, deps.with_clock(clock.clone())).unwrap();

        let mut rec = pipeline.recorder().start("forgotten", no_tags());
        pipeline.recorder().detach(&rec);
        assert_eq!(pipeline.sweep_abandoned(), 0);

        clock.advance(Duration::from_secs(31));
        assert_eq!(pipeline.sweep_abandoned(), 1);
        assert!(pipeline.contexts().is_empty());
        assert_eq!(pipeline.recorder().in_flight(), 0);
        assert_eq!(reporter.spans().len(), 1);

        // A late stop of a swept recording reaches no listener.
        pipeline.recorder().stop(&mut rec);
        assert_eq!(reporter.spans().len(), 1);
    }

    #[tokio::test]
    async fn test_reloader_applies_sampler_updates() {
        let mut config = PipelineConfig::default();
        config.tracing.sampler.probability = Some(0.0);
        let reporter = Arc::new(InMemoryReporter::new());
        let deps = PipelineDeps::new(reporter.clone(), Arc::new(InMemorySink::new()));
        let pipeline = Arc::new(Pipeline::from_config(&config, deps).unwrap());

        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let reloader = pipeline.spawn_reloader(rx, shutdown_rx);

        tx.send(SamplerConfig { probability: Some(1.0), rate: 10 }).unwrap();
        drop(tx);
        reloader.await.unwrap();

        let mut rec = pipeline.recorder().start("op", no_tags());
        pipeline.recorder().stop(&mut rec);
        assert_eq!(reporter.spans().len(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_disabled_by_default() {
        let (deps, _, _) = deps();
        let pipeline = Pipeline::from_config(&PipelineConfig::default(), deps).unwrap();
        let (tx, rx) = broadcast::channel(1);
        assert!(pipeline.spawn_sweeper(rx).is_none());
        drop(tx);
    }
}
