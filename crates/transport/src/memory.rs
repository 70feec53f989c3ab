//! In-process object store for testing
//!
//! Keeps objects in a map and computes entity tags the way S3 does for
//! uploads from the reference clients: plain MD5 below the part size,
//! multipart `md5-of-md5s-N` from it upwards.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use s3archive_core::{EtagHasher, RemoteObjectRecord};

use crate::{ObjectStore, StoreError};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    e_tag: String,
}

/// In-memory object store
pub struct MemoryStore {
    bucket: String,
    hasher: EtagHasher,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing_keys: Mutex<HashSet<String>>,
    listing_error: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Create an empty store using the default multipart part size
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_hasher(bucket, EtagHasher::new())
    }

    /// Create an empty store splitting uploads with `hasher`'s part size
    #[must_use]
    pub fn with_hasher(bucket: impl Into<String>, hasher: EtagHasher) -> Self {
        Self {
            bucket: bucket.into(),
            hasher,
            objects: Mutex::new(BTreeMap::new()),
            failing_keys: Mutex::new(HashSet::new()),
            listing_error: Mutex::new(None),
        }
    }

    /// Store an object directly, as if uploaded at `last_modified`
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        let data = data.into();
        let e_tag = self.e_tag_for(&data);
        self.objects.lock().insert(
            key.into(),
            StoredObject {
                data,
                last_modified,
                e_tag,
            },
        );
    }

    /// Make every upload or delete of `key` fail
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing_keys.lock().insert(key.into());
    }

    /// Make listings fail with `StoreError::Unavailable`
    pub fn fail_listing(&self, message: impl Into<String>) {
        *self.listing_error.lock() = Some(message.into());
    }

    /// All keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    fn e_tag_for(&self, data: &[u8]) -> String {
        let tag = if data.len() >= self.hasher.part_size() {
            self.hasher.multipart_bytes(data)
        } else {
            EtagHasher::single_bytes(data)
        };
        format!("\"{tag}\"")
    }

    fn check_key(&self, key: &str) -> Result<(), StoreError> {
        if self.failing_keys.lock().contains(key) {
            return Err(StoreError::Unavailable(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        if let Some(message) = self.listing_error.lock().clone() {
            return Err(StoreError::Unavailable(message));
        }

        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| RemoteObjectRecord {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
                e_tag: object.e_tag.clone(),
            })
            .collect())
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        self.check_key(key)?;
        let data = tokio::fs::read(path).await?;
        self.insert(key, data, Utc::now());
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.check_key(key)?;
        // S3 deletes are idempotent
        self.objects.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_list_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello world").unwrap();

        let store = MemoryStore::new("bucket");
        store.put_file("p/a.txt", &path).await.unwrap();
        store.insert("other/b.txt", Bytes::from_static(b"b"), Utc::now());

        let listed = store.list_objects("p/").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "p/a.txt");
        assert_eq!(listed[0].size, 11);
        assert_eq!(listed[0].e_tag, "\"5eb63bbbe01eeed093cb22bb8f5acdc3\"");

        store.delete_object("p/a.txt").await.unwrap();
        assert_eq!(store.keys(), vec!["other/b.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_large_upload_gets_multipart_tag() {
        let store = MemoryStore::with_hasher("bucket", EtagHasher::with_part_size(4));
        store.insert("k", Bytes::from_static(b"0123456789"), Utc::now());

        let listed = store.list_objects("").await.unwrap();
        let tag = listed[0].entity_tag();
        assert!(tag.is_multipart());
        assert_eq!(tag.part_count(), Some(3));
    }

    #[tokio::test]
    async fn test_exactly_one_part_is_multipart() {
        let store = MemoryStore::with_hasher("bucket", EtagHasher::with_part_size(4));
        store.insert("full", Bytes::from_static(b"0123"), Utc::now());
        store.insert("short", Bytes::from_static(b"012"), Utc::now());

        let listed = store.list_objects("").await.unwrap();
        let full = listed.iter().find(|r| r.key == "full").unwrap().entity_tag();
        let short = listed.iter().find(|r| r.key == "short").unwrap().entity_tag();

        assert_eq!(full.part_count(), Some(1));
        assert!(!short.is_multipart());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "x").unwrap();

        let store = MemoryStore::new("bucket");
        store.fail_key("bad");
        assert!(store.put_file("bad", &path).await.is_err());
        assert!(store.put_file("good", &path).await.is_ok());

        store.fail_listing("network down");
        assert!(matches!(
            store.remote_index("").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_put_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new("bucket");
        let err = store
            .put_file("k", &dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.is_empty());
    }
}
