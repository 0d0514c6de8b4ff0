// SPDX-License-Identifier: Apache-2.0

//! Storage backends for uploaded log files.
//!
//! A backend exposes container creation and object upload against an
//! object-store API. Backends are constructed through the
//! [`ProviderRegistry`], keyed by provider name, so the upload path
//! stays agnostic of the concrete destination.

pub mod azure;
pub mod error;
pub mod registry;

pub use error::StorageError;
pub use registry::{BackendFactory, ProviderRegistry};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;

/// Raw result of a backend operation.
///
/// Transport failures are returned as [`StorageError`], never folded into
/// the status. Callers must check both: an `Ok` response may still carry
/// a failure status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationResponse {
    pub status: StatusCode,
}

impl OperationResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    /// True for any status in [200,300).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Destination capability for uploaded file contents.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Create a container. Idempotent in intent only: a pre-existing
    /// container surfaces as its backend status (409 on Azure), it is
    /// not special-cased here.
    async fn create_container(&self, container: &str)
        -> Result<OperationResponse, StorageError>;

    /// Upload a complete object into a container.
    async fn upload_object(
        &self,
        container: &str,
        object: &str,
        data: Bytes,
    ) -> Result<OperationResponse, StorageError>;
}
