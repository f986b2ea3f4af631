//! Storage abstraction trait
//!
//! This module defines the Storage trait that all object store backends implement.

use crate::{StorageBackend, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for psry_core::PipelineError {
    fn from(err: StorageError) -> Self {
        psry_core::PipelineError::Storage(err.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object store bound to a single bucket.
///
/// Keys must not contain `..` or start with `/`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Bucket every key of this store lives in.
    fn bucket(&self) -> &str;

    /// Write `data` under `key` with the given access level and return its public URL.
    ///
    /// Writing an existing key replaces the object.
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        visibility: Visibility,
    ) -> StorageResult<String>;

    /// Public URL of `key`: `https://<host>/<bucket>/<key>` for S3 backends.
    fn public_url(&self, key: &str) -> String;

    /// Download an object by its key
    async fn download(&self, key: &str) -> StorageResult<Bytes>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Reject keys that could escape the bucket root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key {:?} contains invalid characters",
            key
        )));
    }
    Ok(())
}
