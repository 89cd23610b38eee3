//! Shutdown coordination for the pipeline's background tasks.
//!
//! The span reporter, the sampler reloader, and the abandoned-recording
//! sweeper each hold a broadcast receiver and are registered here by name.
//! `complete` fires the signal once and then waits for the tasks in
//! registration order, so the reporter can drain its queue before exit.

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Register a background task to wait for at shutdown.
    pub fn track(&self, name: &'static str, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((name, task));
    }

    /// Fire the shutdown signal without waiting.
    pub fn trigger(&self) {
        if self.tx.send(()).is_err() {
            tracing::debug!("Shutdown triggered with no subscribers");
        }
    }

    /// Number of subscribers still holding a receiver.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Trigger shutdown and wait up to `grace` for each tracked task.
    ///
    /// Returns the names of tasks that failed or did not finish in time.
    pub async fn complete(&self, grace: Duration) -> Vec<&'static str> {
        self.trigger();

        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let mut unfinished = Vec::new();
        for (name, task) in tasks {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task stopped"),
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = %e, "Background task failed");
                    unfinished.push(name);
                }
                Err(_) => {
                    tracing::warn!(task = name, grace = ?grace, "Background task did not stop in time");
                    unfinished.push(name);
                }
            }
        }
        unfinished
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
