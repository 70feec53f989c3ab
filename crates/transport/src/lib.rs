//! s3archive-transport: object store access and archive orchestration
//!
//! Provides the [`ObjectStore`] abstraction, its S3 and in-memory
//! implementations, and the [`Archiver`] that drives uploads and deletes from
//! change-detection results.

pub mod archiver;
pub mod memory;
pub mod s3_store;

use std::path::Path;

use async_trait::async_trait;
use s3archive_core::{RemoteIndex, RemoteObjectRecord};

pub use archiver::{ArchiveMode, ArchiveReport, Archiver};
pub use memory::MemoryStore;
pub use s3_store::S3Store;

/// Failures talking to the object store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport failure or unexpected status
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    /// Credentials were rejected or could not be built
    #[error("object store rejected credentials: {0}")]
    Auth(String),
    /// Local file could not be read for upload
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The store answered with something we could not interpret
    #[error("invalid object store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Map an HTTP status to an error, `None` for success
    #[must_use]
    pub fn from_status(status: u16, context: &str) -> Option<Self> {
        match status {
            200..=299 => None,
            401 | 403 => Some(Self::Auth(format!("{context}: HTTP {status}"))),
            _ => Some(Self::Unavailable(format!("{context}: HTTP {status}"))),
        }
    }
}

/// Minimal object store capability used by the archiver
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket
    fn bucket(&self) -> &str;

    /// List every object whose key starts with `prefix`.
    ///
    /// Pagination is handled by the implementation.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObjectRecord>, StoreError>;

    /// Upload a local file under `key`
    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError>;

    /// Delete the object under `key`
    async fn delete_object(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot of the objects under `prefix`.
    ///
    /// Errors are not retried.
    async fn remote_index(&self, prefix: &str) -> Result<RemoteIndex, StoreError> {
        let index = RemoteIndex::from_records(prefix, self.list_objects(prefix).await?);
        tracing::debug!(
            "Listed {} objects ({} bytes) under {:?} in {}",
            index.len(),
            index.total_size(),
            index.prefix(),
            self.bucket()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(StoreError::from_status(200, "put").is_none());
        assert!(StoreError::from_status(204, "delete").is_none());
        assert!(matches!(
            StoreError::from_status(403, "put"),
            Some(StoreError::Auth(_))
        ));
        assert!(matches!(
            StoreError::from_status(401, "put"),
            Some(StoreError::Auth(_))
        ));
        assert!(matches!(
            StoreError::from_status(503, "put"),
            Some(StoreError::Unavailable(_))
        ));
    }
}
