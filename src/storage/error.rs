// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("unknown storage provider: {0}")]
    UnknownProvider(String),

    #[error("backend setup failed: {0}")]
    Setup(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),
}
