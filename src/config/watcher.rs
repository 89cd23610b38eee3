//! Configuration file watcher for hot reload.
//!
//! Only `[tracing.sampler]` can change while the pipeline runs. Every other
//! section is wired into the listener chain at startup, so edits to it are
//! reported and otherwise ignored until restart.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{PipelineConfig, SamplerConfig};

/// What a reloaded file means for the running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Reload {
    /// New sampler settings, if they differ from the running ones.
    pub sampler: Option<SamplerConfig>,
    /// Top-level sections that changed but only take effect on restart.
    pub needs_restart: Vec<&'static str>,
}

impl Reload {
    /// Compare the running configuration with a freshly loaded one.
    pub fn between(current: &PipelineConfig, next: &PipelineConfig) -> Self {
        let sampler = (current.tracing.sampler != next.tracing.sampler)
            .then(|| next.tracing.sampler.clone());

        let mut current_tracing = current.tracing.clone();
        current_tracing.sampler = next.tracing.sampler.clone();

        let mut needs_restart = Vec::new();
        if current.observability != next.observability {
            needs_restart.push("observability");
        }
        if current_tracing != next.tracing {
            needs_restart.push("tracing");
        }
        if current.metrics != next.metrics {
            needs_restart.push("metrics");
        }
        if current.reporter != next.reporter {
            needs_restart.push("reporter");
        }
        if current.observation != next.observation {
            needs_restart.push("observation");
        }

        Self {
            sampler,
            needs_restart,
        }
    }
}

/// Watches the configuration file and forwards sampler changes.
pub struct ConfigWatcher {
    path: PathBuf,
    current: PipelineConfig,
    update_tx: mpsc::UnboundedSender<SamplerConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`, starting from the running `current` config.
    ///
    /// Returns the watcher and a receiver of changed sampler settings.
    pub fn new(
        path: &Path,
        current: PipelineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SamplerConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                current,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as updates are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut current,
            update_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let next = match load_config(&path) {
                        Ok(next) => next,
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Failed to reload config, keeping current configuration"
                            );
                            return;
                        }
                    };

                    let reload = Reload::between(&current, &next);
                    if !reload.needs_restart.is_empty() {
                        tracing::warn!(
                            sections = ?reload.needs_restart,
                            "Config sections changed that only apply after a restart"
                        );
                    }
                    if let Some(sampler) = reload.sampler {
                        tracing::info!(path = ?path, sampler = ?sampler, "Sampler settings changed");
                        if update_tx.send(sampler).is_err() {
                            tracing::debug!("Sampler reload receiver gone");
                        }
                    }
                    current = next;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_file_is_a_noop() {
        let config = PipelineConfig::default();
        let reload = Reload::between(&config, &config.clone());
        assert_eq!(reload.sampler, None);
        assert!(reload.needs_restart.is_empty());
    }

    #[test]
    fn test_sampler_change_is_forwarded_alone() {
        let current = PipelineConfig::default();
        let mut next = current.clone();
        next.tracing.sampler.probability = Some(0.5);

        let reload = Reload::between(&current, &next);
        assert_eq!(reload.sampler.and_then(|s| s.probability), Some(0.5));
        assert!(reload.needs_restart.is_empty());
    }

    #[test]
    fn test_other_sections_need_restart() {
        let current = PipelineConfig::default();
        let mut next = current.clone();
        next.tracing.http_client = true;
        next.metrics.max_tag_values = 5;
        next.observation.ignored_paths = vec!["/health".to_string()];

        let reload = Reload::between(&current, &next);
        assert_eq!(reload.sampler, None);
        assert_eq!(reload.needs_restart, vec!["tracing", "metrics", "observation"]);
    }
}
