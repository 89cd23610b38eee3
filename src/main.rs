//! Observation pipeline demo service.
//!
//! Assembles the pipeline from a TOML file, then drives a synthetic workload
//! of server requests that hop threads and make client calls, so spans and
//! timers can be inspected in the log and on the metrics endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use observation_pipeline::config::{load_config, ConfigWatcher, PipelineConfig};
use observation_pipeline::lifecycle::{signals, Pipeline, PipelineDeps, Shutdown};
use observation_pipeline::listener::DefaultHttpHandler;
use observation_pipeline::observability::{logging, metrics};
use observation_pipeline::recorder::{RecordingKind, HTTP_METHOD, HTTP_PATH, HTTP_STATUS_CODE};
use observation_pipeline::trace::{AsyncReporter, LoggingSender};

const PATHS: [&str; 4] = ["/catalog", "/orders", "/orders/checkout", "/actuator/health"];

#[derive(Parser)]
#[command(name = "observation-pipeline")]
#[command(about = "Runs a demo workload through the observation pipeline", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the sampler when the configuration file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Number of synthetic requests to record.
    #[arg(short, long, default_value_t = 100)]
    recordings: u64,
}

#[derive(Debug, Error)]
enum WorkloadError {
    #[error("catalog cache miss for shard {0}")]
    CacheMiss(u64),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("observation-pipeline v0.1.0 starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let (reporter, reporter_task) =
        AsyncReporter::spawn(LoggingSender, &config.reporter, shutdown.subscribe());
    shutdown.track("span-reporter", reporter_task);
    let reporter = Arc::new(reporter);

    let handler = Arc::new(DefaultHttpHandler);
    let deps = PipelineDeps::new(reporter.clone(), Arc::new(metrics::PrometheusSink))
        .with_http_client(handler.clone())
        .with_http_server(handler);
    let pipeline = Arc::new(Pipeline::from_config(&config, deps)?);
    if let Some(sweeper) = pipeline.spawn_sweeper(shutdown.subscribe()) {
        shutdown.track("abandoned-sweeper", sweeper);
    }

    // Keep the watcher alive for the lifetime of main.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            let watcher = watcher.run()?;
            shutdown.track(
                "sampler-reloader",
                pipeline.spawn_reloader(updates, shutdown.subscribe()),
            );
            Some(watcher)
        }
        _ => None,
    };

    tokio::select! {
        _ = run_workload(pipeline.clone(), cli.recordings) => {
            tracing::info!(recordings = cli.recordings, "Workload complete");
        }
        _ = signals::wait_for_signal() => {
            tracing::info!("Shutdown requested");
        }
    }

    let unfinished = shutdown.complete(Duration::from_secs(5)).await;

    tracing::info!(
        spans_dropped = reporter.dropped(),
        recordings_in_flight = pipeline.recorder().in_flight(),
        contexts_in_flight = pipeline.contexts().len(),
        unfinished_tasks = ?unfinished,
        "Shutdown complete"
    );
    Ok(())
}

async fn run_workload(pipeline: Arc<Pipeline>, count: u64) {
    for seq in 0..count {
        let hop = serve_request(pipeline.clone(), seq);
        if let Err(e) = hop.await {
            tracing::error!(error = %e, seq, "Request task failed");
        }
        tokio::time::sleep(Duration::from_millis(fastrand::u64(5..50))).await;
    }
}

/// One server request: a local lookup, then a client call on a blocking
/// thread. No `.await` happens while a recording is current on a thread.
fn serve_request(pipeline: Arc<Pipeline>, seq: u64) -> tokio::task::JoinHandle<()> {
    let recorder = pipeline.recorder();
    let path = PATHS[fastrand::usize(..PATHS.len())];
    let mut server = recorder.start_kind(
        RecordingKind::HttpServer,
        "http.server.requests",
        [(HTTP_METHOD, "GET"), (HTTP_PATH, path)],
    );

    let shard = seq % 4;
    let lookup = recorder.observe("loadCatalog", |rec| {
        rec.tag("shard", shard.to_string());
        if fastrand::u8(..) < 25 {
            Err(WorkloadError::CacheMiss(shard))
        } else {
            Ok(())
        }
    });

    recorder.detach(&server);
    tokio::task::spawn_blocking(move || {
        let recorder = pipeline.recorder();
        recorder.restore(&server);

        let mut client = recorder.start_kind(
            RecordingKind::HttpClient,
            "http.client.requests",
            [(HTTP_METHOD, "POST"), (HTTP_PATH, "/inventory/reserve")],
        );
        std::thread::sleep(Duration::from_millis(fastrand::u64(1..10)));
        let upstream = if lookup.is_err() { "503" } else { "200" };
        client.tag(HTTP_STATUS_CODE, upstream);
        recorder.stop(&mut client);

        server.tag(HTTP_STATUS_CODE, upstream);
        recorder.stop(&mut server);
    })
}
