// SPDX-License-Identifier: Apache-2.0

//! Directory watcher for newly created files.
//!
//! Wraps OS-level file system notifications (inotify on Linux, FSEvents
//! on macOS, ReadDirectoryChangesW on Windows) into a deduplicated
//! stream of file-creation events. Non-creation events, paths already
//! seen in the session, and transient editor files are filtered before
//! anything reaches the event channel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bounded_channel::{BoundedSender, SendError};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("watcher initialization failed: {0}")]
    Init(String),

    #[error("watch failed for {path:?}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error("watch notification error: {0}")]
    Notify(String),
}

/// A file-creation event. Emitted at most once per distinct path within
/// a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
}

/// Configuration for the directory watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Path suffixes to ignore (transient editor files)
    pub ignore_suffixes: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            ignore_suffixes: vec![".swp".to_string()],
        }
    }
}

pub struct DirectoryWatcher {
    dir: PathBuf,
    config: WatcherConfig,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, config: WatcherConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }

    /// Attach to the directory and start forwarding creation events.
    ///
    /// Setup failures return immediately. On success a background task
    /// owns the OS watch handle and releases it when `cancel` fires; no
    /// events are emitted after that point.
    ///
    /// Accepted paths are pushed onto `events` with a blocking send: a
    /// full channel stalls the notification callback rather than drop
    /// an event. Runtime errors from the OS notification mechanism are
    /// forwarded on `errors`; surfacing is the caller's responsibility.
    pub fn start(
        self,
        events: BoundedSender<FileEvent>,
        errors: BoundedSender<WatchError>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let ignore_suffixes = self.config.ignore_suffixes.clone();

        // The callback runs on notify's own thread; `seen` is owned and
        // mutated there exclusively.
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_)) {
                        return;
                    }
                    for path in event.paths {
                        if ignored(&path, &ignore_suffixes) {
                            debug!(path = ?path, "Ignoring transient file");
                            continue;
                        }
                        if !seen.insert(path.clone()) {
                            continue;
                        }
                        if let Err(SendError::Disconnected) =
                            events.send_blocking(FileEvent { path })
                        {
                            // pipeline went away, nothing left to notify
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = errors.send_blocking(WatchError::Notify(e.to_string()));
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::Watch {
                path: self.dir.clone(),
                message: e.to_string(),
            })?;

        info!(dir = ?self.dir, "Watching directory for rotated log files");

        let dir = self.dir;
        tokio::spawn(async move {
            cancel.cancelled().await;
            // dropping the handle releases the OS watch
            drop(watcher);
            info!(dir = ?dir, "Shut down directory watcher");
        });

        Ok(())
    }
}

fn ignored(path: &Path, suffixes: &[String]) -> bool {
    let name = path.to_string_lossy();
    suffixes.iter().any(|suffix| name.ends_with(suffix))
}
