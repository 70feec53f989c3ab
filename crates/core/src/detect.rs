//! Change detection: local files against a remote index

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use serde::Serialize;

use crate::etag::EtagHasher;
use crate::index::RemoteIndex;
use crate::mapping::PathMapper;
use crate::scan::Scanner;
use crate::signature::LocalSignature;

/// How local files are compared with their remote copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Comparison {
    /// Size mismatch or a newer local modification time
    #[default]
    Metadata,
    /// Local entity tag against the remote one
    ContentHash,
}

/// Why a file was classified as changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeReason {
    /// Local and remote sizes differ
    Size,
    /// Local file was modified after the remote object
    Modified,
    /// Entity tags differ
    Content,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size => "size",
            Self::Modified => "modified",
            Self::Content => "content",
        })
    }
}

/// Classification of one local file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChangeVerdict {
    /// Remote copy is valid
    Unchanged,
    /// Remote copy is stale; every check that fired is listed
    Changed { reasons: Vec<ChangeReason> },
    /// No remote object under the mapped key
    Missing,
}

impl ChangeVerdict {
    /// Whether the file needs to be (re)uploaded
    #[must_use]
    pub fn needs_upload(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A local file that differs from its mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Local path
    pub path: PathBuf,
    /// Remote key the path maps to
    pub key: String,
    /// Classification (never `Unchanged`)
    pub verdict: ChangeVerdict,
}

/// Outcome of one detection pass
#[derive(Debug, Default)]
pub struct Detection {
    /// Files whose mirror is stale or missing
    pub changes: Vec<FileChange>,
    /// Files that could not be stat'ed or read, so were never compared
    pub unreadable: Vec<PathBuf>,
}

/// Classifies local files against a remote index
pub struct ChangeDetector<'a> {
    mapper: &'a PathMapper,
    comparison: Comparison,
    hasher: EtagHasher,
}

impl<'a> ChangeDetector<'a> {
    /// Create a detector resolving keys through `mapper`
    #[must_use]
    pub fn new(mapper: &'a PathMapper, comparison: Comparison) -> Self {
        Self {
            mapper,
            comparison,
            hasher: EtagHasher::new(),
        }
    }

    /// Use a custom entity tag hasher (part size)
    #[must_use]
    pub fn with_hasher(mut self, hasher: EtagHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Classify one local file whose remote key is `key`.
    ///
    /// A key absent from the index is `Missing` without touching the local
    /// file. In metadata mode the size and modification time checks both run,
    /// so a file can be changed for two reasons at once.
    ///
    /// # Errors
    /// Returns an error if the local file cannot be stat'ed or read
    pub fn classify(
        &self,
        local_path: &Path,
        key: &str,
        index: &RemoteIndex,
    ) -> io::Result<ChangeVerdict> {
        let Some(remote) = index.get(key) else {
            return Ok(ChangeVerdict::Missing);
        };

        let local = LocalSignature::stat(local_path)?;
        let mut reasons = Vec::new();

        match self.comparison {
            Comparison::Metadata => {
                if local.size != remote.size {
                    reasons.push(ChangeReason::Size);
                }
                if local.modified > remote.last_modified {
                    reasons.push(ChangeReason::Modified);
                }
            }
            Comparison::ContentHash => {
                let remote_tag = remote.entity_tag();
                let local_tag = local.chunked_digest(&self.hasher, &remote_tag)?;
                if local_tag != remote_tag {
                    tracing::trace!("{key}: local tag {local_tag} != remote {remote_tag}");
                    reasons.push(ChangeReason::Content);
                }
            }
        }

        if reasons.is_empty() {
            Ok(ChangeVerdict::Unchanged)
        } else {
            Ok(ChangeVerdict::Changed { reasons })
        }
    }

    /// Classify `paths` in order.
    ///
    /// A file that cannot be stat'ed or read is logged and recorded in
    /// [`Detection::unreadable`]; the remaining paths are still classified.
    pub fn detect_paths(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
        index: &RemoteIndex,
    ) -> Detection {
        let mut detection = Detection::default();

        for path in paths {
            let key = self.mapper.resolve(&path);

            match self.classify(&path, &key, index) {
                Ok(ChangeVerdict::Unchanged) => {
                    tracing::trace!("Unchanged: {}", path.display());
                }
                Ok(verdict) => {
                    tracing::debug!("{verdict:?}: {} -> {key}", path.display());
                    detection.changes.push(FileChange { path, key, verdict });
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {e}", path.display());
                    detection.unreadable.push(path);
                }
            }
        }

        detection
    }

    /// Walk the scanner's root and classify every file
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked
    pub fn detect(&self, scanner: &Scanner, index: &RemoteIndex) -> Result<Detection> {
        Ok(self.detect_paths(scanner.scan_paths()?, index))
    }

    /// Every file under the scanner's root that is changed or missing
    /// remotely, in walk order, each path once. Unreadable files are skipped.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked
    pub fn changes(&self, scanner: &Scanner, index: &RemoteIndex) -> Result<Vec<FileChange>> {
        Ok(self.detect(scanner, index)?.changes)
    }

    /// Paths of all changed or missing files under the scanner's root
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked
    pub fn find_changed_files(&self, scanner: &Scanner, index: &RemoteIndex) -> Result<Vec<PathBuf>> {
        Ok(self
            .changes(scanner, index)?
            .into_iter()
            .map(|change| change.path)
            .collect())
    }
}
