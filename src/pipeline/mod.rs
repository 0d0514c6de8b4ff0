// SPDX-License-Identifier: Apache-2.0

//! Pipeline controller tying the watcher, the upload dispatcher and the
//! idle timer together.
//!
//! The controller runs a single-threaded event loop over file events,
//! periodic ticks, watcher errors and the cancellation signal. The
//! pipeline is built for a bounded, finite log-producing job: once no
//! new file has appeared for the idle threshold, it re-uploads the most
//! recent file with the end-of-stream trailer and reports
//! [`PipelineOutcome::Finished`]. Whether that terminates the process
//! is the caller's decision, not the library's.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tokio::select;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bounded_channel::bounded;
use crate::storage::{ProviderRegistry, StorageBackend};
use crate::uploader::{UploadDispatcher, UploadTask};
use crate::watcher::{DirectoryWatcher, FileEvent, WatchError, WatcherConfig};

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory to watch for rotated log files (no recursion)
    pub directory: PathBuf,
    /// Storage provider name to look up in the registry
    pub provider: String,
    /// Destination container name
    pub container: String,
    /// Create the container before watching
    pub ensure_container: bool,
    /// Maximum concurrent uploads
    pub max_concurrent_uploads: usize,
    /// Idle check interval
    pub tick_interval: Duration,
    /// Silence between file events after which the producer is
    /// considered finished
    pub idle_threshold: Duration,
    /// Capacity of the watcher event channel
    pub event_buffer: usize,
    pub watcher: WatcherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            provider: crate::storage::azure::AZURE_BLOB_PROVIDER.to_string(),
            container: "logs".to_string(),
            ensure_container: false,
            max_concurrent_uploads: 1,
            tick_interval: Duration::from_secs(2),
            idle_threshold: Duration::from_secs(5),
            event_buffer: 1,
            watcher: WatcherConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.directory.as_os_str().is_empty() {
            return Err("A watch directory must be specified".to_string());
        }

        if self.container.is_empty() {
            return Err("A container name must be specified".to_string());
        }

        if self.idle_threshold < self.tick_interval {
            return Err("Idle threshold must not be shorter than the tick interval".to_string());
        }

        Ok(())
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The producer went silent past the idle threshold; the last file
    /// was re-uploaded with the end-of-stream trailer. The session is
    /// complete and will produce nothing further.
    Finished { last_file: PathBuf },
    /// Explicit stop via the cancellation token.
    Stopped,
}

pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<ProviderRegistry>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self { config, registry }
    }

    /// Run the pipeline until it finishes, fails or is cancelled.
    ///
    /// Returns an error immediately on provider-lookup or watcher-setup
    /// failure; afterwards only a watcher-runtime error ends the run
    /// early. Per-file upload failures are logged and do not cross this
    /// boundary.
    pub async fn run(&self, cancel: CancellationToken) -> Result<PipelineOutcome, BoxError> {
        self.config.validate().map_err(BoxError::from)?;

        let backend: Arc<dyn StorageBackend> =
            Arc::from(self.registry.lookup(&self.config.provider)?);

        if self.config.ensure_container {
            let response = backend.create_container(&self.config.container).await?;
            if response.status == StatusCode::CONFLICT {
                info!(container = %self.config.container, "Container already exists");
            } else if !response.is_success() {
                return Err(format!(
                    "failed to create container {}: status {}",
                    self.config.container, response.status
                )
                .into());
            }
        }

        let (event_tx, mut event_rx) = bounded::<FileEvent>(self.config.event_buffer);
        let (error_tx, mut error_rx) = bounded::<WatchError>(1);

        let watcher_cancel = cancel.child_token();
        DirectoryWatcher::new(&self.config.directory, self.config.watcher.clone()).start(
            event_tx,
            error_tx,
            watcher_cancel.clone(),
        )?;

        let mut dispatcher = UploadDispatcher::new(
            backend,
            self.config.container.clone(),
            self.config.max_concurrent_uploads,
        );

        info!(
            dir = ?self.config.directory,
            provider = %self.config.provider,
            container = %self.config.container,
            workers = self.config.max_concurrent_uploads,
            "Started upload pipeline"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_event_at: Option<Instant> = None;
        let mut last_file: Option<PathBuf> = None;

        loop {
            select! {
                event = event_rx.next() => {
                    let Some(FileEvent { path }) = event else {
                        warn!("Watcher event channel closed, stopping pipeline");
                        dispatcher.shutdown().await;
                        return Ok(PipelineOutcome::Stopped);
                    };

                    last_event_at = Some(Instant::now());
                    last_file = Some(path.clone());
                    dispatcher.dispatch(UploadTask::new(path)).await;
                },

                _ = ticker.tick() => {
                    // the idle path needs at least one prior event; an
                    // empty session has no "last file" to finalize
                    let (Some(seen_at), Some(path)) = (last_event_at, last_file.clone()) else {
                        continue;
                    };

                    let idle = seen_at.elapsed();
                    if idle <= self.config.idle_threshold {
                        continue;
                    }

                    info!(
                        idle = ?idle,
                        path = ?path,
                        "No rotated file created within the idle threshold, finalizing"
                    );
                    watcher_cancel.cancel();
                    dispatcher.upload_now(UploadTask::finalizing(&path)).await;
                    return Ok(PipelineOutcome::Finished { last_file: path });
                },

                err = error_rx.next() => {
                    let Some(err) = err else {
                        warn!("Watcher error channel closed, stopping pipeline");
                        dispatcher.shutdown().await;
                        return Ok(PipelineOutcome::Stopped);
                    };
                    error!(error = %err, "Watcher error, stopping pipeline");
                    return Err(err.into());
                },

                _ = cancel.cancelled() => {
                    info!("Pipeline received shutdown signal, draining uploads");
                    dispatcher.shutdown().await;
                    return Ok(PipelineOutcome::Stopped);
                },
            }
        }
    }
}
