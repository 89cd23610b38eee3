//! Hand-off of finished spans to exporters.
//!
//! # Data Flow
//! ```text
//! Span::end (sampled)
//!     → SpanReporter::report (never blocks, never fails)
//!     → AsyncReporter bounded queue (drops + counts when full)
//!     → flush task: batch by size or message timeout
//!     → SpanSender::send (exporter; errors logged here)
//! ```
//!
//! # Design Decisions
//! - Delivery is the exporter's problem; the recording caller never sees it
//! - The queue is bounded so a stalled exporter cannot grow memory
//! - Shutdown drains whatever is queued before the task exits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::ReporterConfig;
use crate::observability::metrics;
use crate::trace::span::FinishedSpan;

/// Accepts finished spans.
pub trait SpanReporter: Send + Sync {
    fn report(&self, span: FinishedSpan);
}

/// Errors raised by exporters.
#[derive(Debug, Error)]
pub enum SenderError {
    /// Span could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Exporter endpoint refused or was unreachable.
    #[error("Sender unavailable: {0}")]
    Unavailable(String),
}

/// Delivers batches of spans to an external system.
pub trait SpanSender: Send + Sync {
    fn send(&self, spans: &[FinishedSpan]) -> Result<(), SenderError>;
}

/// Writes each span as a JSON line into the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSender;

impl SpanSender for LoggingSender {
    fn send(&self, spans: &[FinishedSpan]) -> Result<(), SenderError> {
        for span in spans {
            let json = serde_json::to_string(span)?;
            tracing::info!(target: "observation_pipeline::spans", span = %json, "Span reported");
        }
        Ok(())
    }
}

/// Keeps reported spans in memory.
#[derive(Debug, Default)]
pub struct InMemoryReporter {
    spans: Mutex<Vec<FinishedSpan>>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far, in report order.
    pub fn spans(&self) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl SpanReporter for InMemoryReporter {
    fn report(&self, span: FinishedSpan) {
        self.spans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(span);
    }
}

/// Discards every span.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl SpanReporter for NoopReporter {
    fn report(&self, _span: FinishedSpan) {}
}

/// Queues spans and ships them from a background task.
#[derive(Debug)]
pub struct AsyncReporter {
    tx: mpsc::Sender<FinishedSpan>,
    dropped: Arc<AtomicU64>,
}

impl AsyncReporter {
    /// Start the flush task on the current Tokio runtime.
    pub fn spawn<S>(
        sender: S,
        config: &ReporterConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>)
    where
        S: SpanSender + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queued_max_spans.max(1));
        let flush = FlushLoop {
            rx,
            sender,
            batch_size: config.batch_size.max(1),
            message_timeout: Duration::from_millis(config.message_timeout_ms.max(1)),
        };
        let handle = tokio::spawn(flush.run(shutdown));

        tracing::info!(
            queued_max_spans = config.queued_max_spans,
            batch_size = config.batch_size,
            message_timeout_ms = config.message_timeout_ms,
            "Span reporter started"
        );

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Spans rejected because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl SpanReporter for AsyncReporter {
    fn report(&self, span: FinishedSpan) {
        if let Err(e) = self.tx.try_send(span) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue_full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            metrics::record_span_dropped(reason);
            tracing::debug!(reason, dropped_total = total, "Span dropped by reporter");
        }
    }
}

struct FlushLoop<S> {
    rx: mpsc::Receiver<FinishedSpan>,
    sender: S,
    batch_size: usize,
    message_timeout: Duration,
}

impl<S: SpanSender> FlushLoop<S> {
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.message_timeout);

        loop {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(span) => {
                        batch.push(span);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch);
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => self.flush(&mut batch),
                _ = shutdown.recv() => {
                    while let Ok(span) = self.rx.try_recv() {
                        batch.push(span);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch);
                        }
                    }
                    break;
                }
            }
        }

        self.flush(&mut batch);
        tracing::info!("Span reporter stopped");
    }

    fn flush(&self, batch: &mut Vec<FinishedSpan>) {
        if batch.is_empty() {
            return;
        }
        match self.sender.send(batch) {
            Ok(()) => metrics::record_spans_sent(batch.len()),
            Err(e) => {
                tracing::warn!(error = %e, spans = batch.len(), "Span sender failed, batch discarded");
                metrics::record_span_dropped("sender_error");
            }
        }
        batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn finished(id: u64) -> FinishedSpan {
        FinishedSpan {
            trace_id: 1,
            id,
            parent_id: None,
            name: format!("span-{id}"),
            kind: None,
            timestamp: 0,
            duration: 1,
            tags: BTreeMap::new(),
        }
    }

    #[derive(Clone, Default)]
    struct CollectingSender {
        batches: Arc<Mutex<Vec<Vec<u64>>>>,
    }

    impl SpanSender for CollectingSender {
        fn send(&self, spans: &[FinishedSpan]) -> Result<(), SenderError> {
            self.batches
                .lock()
                .unwrap()
                .push(spans.iter().map(|s| s.id).collect());
            Ok(())
        }
    }

    struct FailingSender;

    impl SpanSender for FailingSender {
        fn send(&self, _spans: &[FinishedSpan]) -> Result<(), SenderError> {
            Err(SenderError::Unavailable("connection refused".into()))
        }
    }

    fn config(queued_max_spans: usize, batch_size: usize) -> ReporterConfig {
        ReporterConfig {
            queued_max_spans,
            batch_size,
            message_timeout_ms: 10_000,
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let sender = CollectingSender::default();
        let (tx, rx) = broadcast::channel(1);
        let (reporter, handle) = AsyncReporter::spawn(sender.clone(), &config(2, 100), rx);

        // Current-thread runtime: the flush task has not run yet.
        for id in 0..5 {
            reporter.report(finished(id));
        }
        assert_eq!(reporter.dropped(), 3);

        tx.send(()).unwrap();
        handle.await.unwrap();

        let batches = sender.batches.lock().unwrap().clone();
        assert_eq!(batches.concat(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_batches_by_size() {
        let sender = CollectingSender::default();
        let (tx, rx) = broadcast::channel(1);
        let (reporter, handle) = AsyncReporter::spawn(sender.clone(), &config(100, 2), rx);

        for id in 0..5 {
            reporter.report(finished(id));
        }
        tokio::task::yield_now().await;

        tx.send(()).unwrap();
        handle.await.unwrap();

        let batches = sender.batches.lock().unwrap().clone();
        assert_eq!(batches.concat(), vec![0, 1, 2, 3, 4]);
        assert!(batches.iter().all(|b| b.len() <= 2));
    }

    #[tokio::test]
    async fn test_sender_failure_is_contained() {
        let (tx, rx) = broadcast::channel(1);
        let (reporter, handle) = AsyncReporter::spawn(FailingSender, &config(10, 1), rx);

        reporter.report(finished(1));
        tokio::task::yield_now().await;
        reporter.report(finished(2));

        tx.send(()).unwrap();
        assert!(handle.await.is_ok());
    }

    #[test]
    fn test_logging_sender_encodes() {
        assert!(LoggingSender.send(&[finished(9)]).is_ok());
    }
}
