// SPDX-License-Identifier: Apache-2.0

//! End-to-end pipeline tests against an in-memory storage backend.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use logship::pipeline::{Pipeline, PipelineConfig, PipelineOutcome};
use logship::storage::{OperationResponse, ProviderRegistry, StorageBackend, StorageError};
use logship::uploader::FINAL_UPLOAD_TRAILER;

#[derive(Clone, Default, Debug)]
struct MemoryBackend {
    uploads: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
    containers: Arc<Mutex<Vec<String>>>,
    upload_delay: Option<Duration>,
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn create_container(&self, container: &str) -> Result<OperationResponse, StorageError> {
        let mut containers = self.containers.lock().unwrap();
        if containers.iter().any(|c| c == container) {
            return Ok(OperationResponse::new(StatusCode::CONFLICT));
        }
        containers.push(container.to_string());
        Ok(OperationResponse::new(StatusCode::CREATED))
    }

    async fn upload_object(
        &self,
        container: &str,
        object: &str,
        data: Bytes,
    ) -> Result<OperationResponse, StorageError> {
        if let Some(delay) = self.upload_delay {
            sleep(delay).await;
        }
        self.uploads.lock().unwrap().push((
            container.to_string(),
            object.to_string(),
            data.to_vec(),
        ));
        Ok(OperationResponse::new(StatusCode::CREATED))
    }
}

fn registry_with(backend: MemoryBackend) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register(
        "memory",
        Box::new(move || Ok(Box::new(backend.clone()) as Box<dyn StorageBackend>)),
    );
    Arc::new(registry)
}

fn fast_config(dir: &TempDir) -> PipelineConfig {
    PipelineConfig {
        directory: dir.path().to_path_buf(),
        provider: "memory".to_string(),
        container: "bucket".to_string(),
        tick_interval: Duration::from_millis(100),
        idle_threshold: Duration::from_millis(400),
        ..Default::default()
    }
}

fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn rotation_then_silence_finalizes_last_file() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryBackend::default();
    let pipeline = Pipeline::new(fast_config(&dir), registry_with(backend.clone()));

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { pipeline.run(run_cancel).await });

    // let the watch attach before producing files
    sleep(Duration::from_millis(200)).await;
    write_file(&dir, "app.log", b"first\n");
    sleep(Duration::from_millis(150)).await;
    let last = write_file(&dir, "app.log.1", b"second\n");

    let outcome = timeout(Duration::from_secs(10), handle)
        .await
        .expect("pipeline should finish after the idle threshold")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Finished { last_file: last });

    let uploads = backend.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 3, "two rotations plus one terminal upload");

    assert_eq!(uploads[0].0, "bucket");
    assert_eq!(uploads[0].1, "app.log");
    assert_eq!(uploads[0].2, b"first\n");

    assert_eq!(uploads[1].1, "app.log.1");
    assert_eq!(uploads[1].2, b"second\n");

    // the terminal upload re-ships the last file with the trailer
    let mut expected = b"second\n".to_vec();
    expected.extend_from_slice(FINAL_UPLOAD_TRAILER.as_bytes());
    assert_eq!(uploads[2].1, "app.log.1");
    assert_eq!(uploads[2].2, expected);
}

#[tokio::test]
async fn empty_session_never_finalizes() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryBackend::default();
    let pipeline = Pipeline::new(fast_config(&dir), registry_with(backend.clone()));

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { pipeline.run(run_cancel).await });

    // well past the idle threshold with no events: the pipeline must
    // keep waiting rather than finalize an undefined "last file"
    sleep(Duration::from_millis(900)).await;
    assert!(!handle.is_finished());

    cancel.cancel();
    let outcome = timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped);
    assert!(backend.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_provider_fails_start() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&dir);
    config.provider = "gcs".to_string();

    let pipeline = Pipeline::new(config, Arc::new(ProviderRegistry::new()));
    let err = pipeline.run(CancellationToken::new()).await.unwrap_err();
    assert!(err.to_string().contains("unknown storage provider"));
}

#[tokio::test]
async fn stop_drains_in_flight_uploads() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryBackend {
        upload_delay: Some(Duration::from_millis(500)),
        ..Default::default()
    };
    let pipeline = Pipeline::new(fast_config(&dir), registry_with(backend.clone()));

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { pipeline.run(run_cancel).await });

    sleep(Duration::from_millis(200)).await;
    write_file(&dir, "app.log", b"slow\n");
    // wait for the event to be dispatched, then stop while the upload
    // is still in flight
    sleep(Duration::from_millis(250)).await;
    cancel.cancel();

    let outcome = timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped);

    let uploads = backend.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1, "in-flight upload finished before stop");
    assert_eq!(uploads[0].1, "app.log");
}

#[tokio::test]
async fn ensure_container_tolerates_existing() {
    let dir = TempDir::new().unwrap();
    let backend = MemoryBackend::default();
    backend
        .containers
        .lock()
        .unwrap()
        .push("bucket".to_string());

    let mut config = fast_config(&dir);
    config.ensure_container = true;

    let pipeline = Pipeline::new(config, registry_with(backend.clone()));
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(async move { pipeline.run(run_cancel).await });

    // a pre-existing container (409) must not abort startup
    sleep(Duration::from_millis(300)).await;
    assert!(!handle.is_finished());

    cancel.cancel();
    let outcome = timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Stopped);
}
