// SPDX-License-Identifier: Apache-2.0

//! Bounded-concurrency upload workers.
//!
//! The dispatcher reads a file, optionally appends the end-of-stream
//! trailer, and hands the bytes to the storage backend. Failures are
//! terminal for that task only: a file that cannot be read or an upload
//! that comes back non-2xx is logged and abandoned, never retried.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::storage::StorageBackend;

/// Fixed line appended to the last upload of a session, marking logical
/// end-of-stream for downstream readers.
pub const FINAL_UPLOAD_TRAILER: &str = "--- END OF NEBULA IMPORTER ---\n";

/// One upload of one file. `is_final` marks the terminal upload of the
/// session and triggers the trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub path: PathBuf,
    pub is_final: bool,
}

impl UploadTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_final: false,
        }
    }

    pub fn finalizing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_final: true,
        }
    }
}

pub struct UploadDispatcher {
    backend: Arc<dyn StorageBackend>,
    container: String,
    slots: Arc<Semaphore>,
    workers: JoinSet<()>,
}

impl UploadDispatcher {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        container: impl Into<String>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            backend,
            container: container.into(),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            workers: JoinSet::new(),
        }
    }

    /// Submit a task to the pool. Suspends while every worker slot is
    /// busy, guaranteeing eventual processing instead of failing fast.
    pub async fn dispatch(&mut self, task: UploadTask) {
        // the semaphore is never closed, acquire cannot fail
        let Ok(permit) = self.slots.clone().acquire_owned().await else {
            return;
        };

        // opportunistically reap finished workers
        while self.workers.try_join_next().is_some() {}

        let backend = self.backend.clone();
        let container = self.container.clone();
        self.workers.spawn(async move {
            run_upload(backend, &container, task).await;
            drop(permit);
        });
    }

    /// Run one upload inline, bypassing the worker pool. Used for the
    /// terminal upload so it completes before the pipeline returns.
    pub async fn upload_now(&self, task: UploadTask) {
        run_upload(self.backend.clone(), &self.container, task).await;
    }

    /// Wait for all in-flight uploads to finish.
    pub async fn shutdown(mut self) {
        while self.workers.join_next().await.is_some() {}
    }
}

async fn run_upload(backend: Arc<dyn StorageBackend>, container: &str, task: UploadTask) {
    let Some(object_name) = task.path.file_name().and_then(|n| n.to_str()) else {
        warn!(path = ?task.path, "Skipping upload, path has no usable file name");
        return;
    };
    let object_name = object_name.to_string();

    let mut data = match tokio::fs::read(&task.path).await {
        Ok(data) => data,
        Err(e) => {
            warn!(path = ?task.path, error = %e, "Skipping upload, failed to read file");
            return;
        }
    };

    if task.is_final {
        data.extend_from_slice(FINAL_UPLOAD_TRAILER.as_bytes());
    }

    match backend
        .upload_object(container, &object_name, data.into())
        .await
    {
        Ok(response) if response.is_success() => {
            info!(
                object = %object_name,
                status = response.status.as_u16(),
                is_final = task.is_final,
                "Uploaded file"
            );
        }
        Ok(response) => {
            error!(
                object = %object_name,
                status = response.status.as_u16(),
                "Upload rejected by backend"
            );
        }
        Err(e) => {
            error!(object = %object_name, error = %e, "Upload failed");
        }
    }
}
