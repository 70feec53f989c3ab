//! Local file signatures: size, modification time and on-demand entity tag

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::etag::{EntityTag, EtagHasher};

/// Metadata of a local file, captured for a single comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalSignature {
    /// Absolute or walk-relative path of the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time (UTC)
    pub modified: DateTime<Utc>,
}

impl LocalSignature {
    /// Stat a file
    ///
    /// # Errors
    /// Returns an error if the file does not exist or its metadata is unreadable
    pub fn stat(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
        })
    }

    /// Compute the local entity tag in the shape of `remote`
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn chunked_digest(&self, hasher: &EtagHasher, remote: &EntityTag) -> io::Result<EntityTag> {
        hasher.matching(&self.path, remote)
    }
}
