// SPDX-License-Identifier: Apache-2.0

//! Name-keyed factory registry for storage backends.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

use crate::storage::{StorageBackend, StorageError};

/// Zero-argument factory producing a connected backend. Construction is
/// fallible: any one-time setup (credential derivation, endpoint
/// resolution, client build) happens here rather than on first use.
pub type BackendFactory =
    Box<dyn Fn() -> Result<Box<dyn StorageBackend>, StorageError> + Send + Sync>;

/// Registry of storage providers, constructed explicitly and handed to
/// the pipeline at startup. Registration and lookup may race in a
/// multi-backend build, hence the mutex.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<HashMap<String, BackendFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory under a name. First registration
    /// wins: a duplicate is logged and ignored, never overwritten.
    pub fn register(&self, name: &str, factory: BackendFactory) {
        let mut providers = self.providers.lock().unwrap();
        if providers.contains_key(name) {
            warn!(provider = name, "Storage provider was registered twice");
            return;
        }
        info!(provider = name, "Registered storage provider");
        providers.insert(name.to_string(), factory);
    }

    /// Construct a backend for the named provider.
    pub fn lookup(&self, name: &str) -> Result<Box<dyn StorageBackend>, StorageError> {
        let providers = self.providers.lock().unwrap();
        match providers.get(name) {
            Some(factory) => factory(),
            None => Err(StorageError::UnknownProvider(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OperationResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct StubBackend {
        status: StatusCode,
    }

    #[async_trait]
    impl StorageBackend for StubBackend {
        async fn create_container(
            &self,
            _container: &str,
        ) -> Result<OperationResponse, StorageError> {
            Ok(OperationResponse::new(self.status))
        }

        async fn upload_object(
            &self,
            _container: &str,
            _object: &str,
            _data: Bytes,
        ) -> Result<OperationResponse, StorageError> {
            Ok(OperationResponse::new(self.status))
        }
    }

    #[test]
    fn lookup_unknown_provider() {
        let registry = ProviderRegistry::new();
        let err = registry.lookup("gcs").unwrap_err();
        assert!(matches!(err, StorageError::UnknownProvider(name) if name == "gcs"));
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let registry = ProviderRegistry::new();
        registry.register(
            "stub",
            Box::new(|| {
                Ok(Box::new(StubBackend {
                    status: StatusCode::CREATED,
                }))
            }),
        );
        // second registration for the same name must be ignored
        registry.register(
            "stub",
            Box::new(|| {
                Ok(Box::new(StubBackend {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }))
            }),
        );

        let backend = registry.lookup("stub").unwrap();
        let resp = backend.create_container("c").await.unwrap();
        assert_eq!(resp.status, StatusCode::CREATED);
    }

    #[test]
    fn factory_runs_per_lookup() {
        let registry = ProviderRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register(
            "stub",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(StubBackend {
                    status: StatusCode::OK,
                }))
            }),
        );

        let _ = registry.lookup("stub").unwrap();
        let _ = registry.lookup("stub").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn factory_errors_surface_from_lookup() {
        let registry = ProviderRegistry::new();
        registry.register(
            "broken",
            Box::new(|| Err(StorageError::Setup("bad credentials".into()))),
        );

        let err = registry.lookup("broken").unwrap_err();
        assert!(matches!(err, StorageError::Setup(_)));
    }
}
