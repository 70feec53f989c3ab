//! S3 (and S3-compatible) object store backed by rust-s3

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::Region;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::serde_types::Object;

use s3archive_core::{ArchiveConfig, RemoteObjectRecord};

use crate::{ObjectStore, StoreError};

/// Object store client for one bucket.
///
/// Built once per run and shared between upload tasks; rust-s3 uploads files
/// larger than 8 MiB as multipart uploads with 8 MiB parts, which is the
/// shape the entity tag comparison expects.
pub struct S3Store {
    bucket: Box<Bucket>,
}

impl S3Store {
    /// Create a client from the archive configuration
    ///
    /// # Errors
    /// Returns `StoreError::Auth` if the credentials cannot be built and
    /// `StoreError::Unavailable` if the bucket handle cannot be created
    pub fn new(config: &ArchiveConfig) -> Result<Self, StoreError> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StoreError::Auth(e.to_string()))?;

        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint,
        };

        let bucket = Bucket::new(&config.bucket, region, credentials).map_err(map_s3_error)?;
        let bucket = if config.path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self { bucket })
    }
}

/// Classify rust-s3 errors into the store taxonomy
fn map_s3_error(error: S3Error) -> StoreError {
    match error {
        S3Error::HttpFailWithBody(status @ (401 | 403), body) => {
            StoreError::Auth(format!("HTTP {status}: {body}"))
        }
        S3Error::Credentials(e) => StoreError::Auth(e.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn to_record(object: Object) -> Result<RemoteObjectRecord, StoreError> {
    record_from_parts(object.key, object.size, &object.last_modified, object.e_tag)
}

fn record_from_parts(
    key: String,
    size: u64,
    last_modified: &str,
    e_tag: Option<String>,
) -> Result<RemoteObjectRecord, StoreError> {
    let last_modified = DateTime::parse_from_rfc3339(last_modified)
        .map_err(|e| {
            StoreError::InvalidResponse(format!("bad LastModified {last_modified:?} for {key}: {e}"))
        })?
        .with_timezone(&Utc);

    Ok(RemoteObjectRecord {
        key,
        size,
        last_modified,
        e_tag: e_tag.unwrap_or_default(),
    })
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket.name
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<RemoteObjectRecord>, StoreError> {
        // `list` follows continuation tokens until the listing is exhausted
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(map_s3_error)?;

        pages
            .into_iter()
            .flat_map(|page| page.contents)
            .filter(|object| !object.key.ends_with('/'))
            .map(to_record)
            .collect()
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<(), StoreError> {
        let mut file = tokio::fs::File::open(path).await?;
        let response = self
            .bucket
            .put_object_stream(&mut file, key)
            .await
            .map_err(map_s3_error)?;

        if let Some(error) = StoreError::from_status(response.status_code(), key) {
            return Err(error);
        }

        tracing::debug!(
            "Uploaded {} -> s3://{}/{key}",
            path.display(),
            self.bucket.name
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        let response = self.bucket.delete_object(key).await.map_err(map_s3_error)?;

        if let Some(error) = StoreError::from_status(response.status_code(), key) {
            return Err(error);
        }

        tracing::debug!("Deleted s3://{}/{key}", self.bucket.name);
        Ok(())
    }
}
