//! Archive orchestration: detect changes, then upload or delete through an
//! object store with a bounded number of concurrent transfers

use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::Result;
use futures::StreamExt as _;
use futures::stream;

use s3archive_core::config::DEFAULT_CONCURRENCY;
use s3archive_core::{
    ChangeDetector, Comparison, Detection, EtagHasher, FileChange, PathMapper, RemoteIndex,
    Scanner,
};

use crate::{ObjectStore, StoreError};

/// Which files an archive run uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveMode {
    /// Only files missing remotely or changed by size/modification time
    #[default]
    Incremental,
    /// Every file under the directory
    Full,
}

/// Result of a batch of uploads or deletes
#[derive(Debug, Default)]
pub struct ArchiveReport {
    /// Number of successful transfers
    pub success_count: u32,
    /// Failed transfers with their errors
    pub errors: Vec<(PathBuf, StoreError)>,
}

impl ArchiveReport {
    /// Whether every transfer succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A unit of work for the transfer pool
struct Transfer {
    path: PathBuf,
    key: String,
}

impl Transfer {
    fn from_pairs(pairs: Vec<(PathBuf, String)>) -> Vec<Self> {
        pairs
            .into_iter()
            .map(|(path, key)| Self { path, key })
            .collect()
    }
}

/// Mirrors local directories into an object store
pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    mapper: Arc<PathMapper>,
    excludes: Vec<String>,
    concurrency: usize,
    hasher: EtagHasher,
}

impl Archiver {
    /// Create an archiver over a shared store client and mapping table
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, mapper: Arc<PathMapper>) -> Self {
        Self {
            store,
            mapper,
            excludes: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            hasher: EtagHasher::new(),
        }
    }

    /// Limit the number of concurrent transfers
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Glob patterns left out of every walk
    #[must_use]
    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    /// Entity tag hasher used for content comparisons (multipart part size)
    #[must_use]
    pub fn with_hasher(mut self, hasher: EtagHasher) -> Self {
        self.hasher = hasher;
        self
    }

    fn scanner(&self, directory: &Path) -> Scanner {
        Scanner::new(directory).excludes(self.excludes.iter().cloned())
    }

    /// List the remote objects under the key `directory` maps to.
    ///
    /// # Errors
    /// Propagates listing failures unchanged; nothing is retried
    pub async fn remote_index(&self, directory: &Path) -> Result<RemoteIndex, StoreError> {
        let prefix = self.mapper.resolve(&std::path::absolute(directory)?);
        self.store.remote_index(&prefix).await
    }

    /// Classify every file under `directory` against a fresh listing.
    ///
    /// Relative directories are resolved against the working directory
    /// first, since mapping prefixes are absolute.
    ///
    /// # Errors
    /// Returns an error if listing the remote index or walking the directory
    /// fails
    pub async fn detect(&self, directory: &Path, comparison: Comparison) -> Result<Detection> {
        let directory = std::path::absolute(directory)?;
        let index = self.remote_index(&directory).await?;

        let mapper = Arc::clone(&self.mapper);
        let scanner = self.scanner(&directory);
        let hasher = self.hasher;

        // Hashing reads whole files; keep it off the async workers
        let detection = tokio::task::spawn_blocking(move || {
            ChangeDetector::new(&mapper, comparison)
                .with_hasher(hasher)
                .detect(&scanner, &index)
        })
        .await??;

        Ok(detection)
    }

    /// Files under `directory` whose mirror is stale or missing.
    /// Unreadable files are skipped.
    ///
    /// # Errors
    /// See [`Archiver::detect`]
    pub async fn changes(&self, directory: &Path, comparison: Comparison) -> Result<Vec<FileChange>> {
        Ok(self.detect(directory, comparison).await?.changes)
    }

    /// Paths under `directory` that are changed or missing remotely
    ///
    /// # Errors
    /// See [`Archiver::changes`]
    pub async fn find_changed_files(
        &self,
        directory: &Path,
        comparison: Comparison,
    ) -> Result<Vec<PathBuf>> {
        Ok(self
            .changes(directory, comparison)
            .await?
            .into_iter()
            .map(|change| change.path)
            .collect())
    }

    /// Whether every file under `directory` has a valid mirror.
    ///
    /// A file that could not be read was never compared, so it makes the
    /// archive invalid just like a stale or missing one.
    ///
    /// # Errors
    /// See [`Archiver::detect`]
    pub async fn is_archive_valid(&self, directory: &Path, comparison: Comparison) -> Result<bool> {
        let detection = self.detect(directory, comparison).await?;
        for change in &detection.changes {
            tracing::info!("Not archived: {}", change.path.display());
        }
        for path in &detection.unreadable {
            tracing::info!("Not verified: {}", path.display());
        }
        Ok(detection.changes.is_empty() && detection.unreadable.is_empty())
    }

    /// Upload the files under `directory` that need it.
    ///
    /// Incremental runs compare by size and modification time. Each upload
    /// failure is recorded in the report without stopping the batch;
    /// `on_done` is called once per finished transfer.
    ///
    /// # Errors
    /// Returns an error if change detection fails (including listing)
    pub async fn archive_directory(
        &self,
        directory: &Path,
        mode: ArchiveMode,
        on_done: impl FnMut(&Path),
    ) -> Result<ArchiveReport> {
        let planned = self.planned_uploads(directory, mode).await?;
        tracing::info!(
            "Uploading {} files from {}",
            planned.len(),
            directory.display()
        );
        Ok(self.upload_files(planned, on_done).await)
    }

    /// Files an archive run would upload, with their keys
    ///
    /// # Errors
    /// Returns an error if change detection fails
    pub async fn planned_uploads(
        &self,
        directory: &Path,
        mode: ArchiveMode,
    ) -> Result<Vec<(PathBuf, String)>> {
        match mode {
            ArchiveMode::Incremental => Ok(self
                .changes(directory, Comparison::Metadata)
                .await?
                .into_iter()
                .map(|change| (change.path, change.key))
                .collect()),
            ArchiveMode::Full => self.local_files(directory),
        }
    }

    /// Upload `(path, key)` pairs through the transfer pool
    pub async fn upload_files(
        &self,
        files: Vec<(PathBuf, String)>,
        on_done: impl FnMut(&Path),
    ) -> ArchiveReport {
        self.run_pool(Transfer::from_pairs(files), on_done, |store, transfer| async move {
            let result = store.put_file(&transfer.key, &transfer.path).await;
            (transfer, result)
        })
        .await
    }

    /// Delete the remote object of every file under `directory`.
    ///
    /// The walk is local: remote objects without a local counterpart are
    /// left alone.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked
    pub async fn delete_archive(
        &self,
        directory: &Path,
        on_done: impl FnMut(&Path),
    ) -> Result<ArchiveReport> {
        let files = self.local_files(directory)?;
        tracing::info!(
            "Deleting {} objects for {}",
            files.len(),
            directory.display()
        );
        Ok(self.delete_files(files, on_done).await)
    }

    /// Delete the objects of `(path, key)` pairs through the transfer pool
    pub async fn delete_files(
        &self,
        files: Vec<(PathBuf, String)>,
        on_done: impl FnMut(&Path),
    ) -> ArchiveReport {
        self.run_pool(Transfer::from_pairs(files), on_done, |store, transfer| async move {
            let result = store.delete_object(&transfer.key).await;
            (transfer, result)
        })
        .await
    }

    /// Every file under `directory` with its key, without consulting the store
    ///
    /// # Errors
    /// Returns an error if the directory cannot be walked
    pub fn local_files(&self, directory: &Path) -> Result<Vec<(PathBuf, String)>> {
        Ok(self
            .scanner(&std::path::absolute(directory)?)
            .scan_paths()?
            .into_iter()
            .map(|path| (path.clone(), self.mapper.resolve(&path)))
            .collect())
    }

    /// Run `op` over `transfers` with at most `concurrency` in flight,
    /// capturing each task's error
    async fn run_pool<F, Fut>(
        &self,
        transfers: Vec<Transfer>,
        mut on_done: impl FnMut(&Path),
        op: F,
    ) -> ArchiveReport
    where
        F: Fn(Arc<dyn ObjectStore>, Transfer) -> Fut,
        Fut: Future<Output = (Transfer, Result<(), StoreError>)>,
    {
        let mut report = ArchiveReport::default();

        let mut results = stream::iter(transfers)
            .map(|transfer| op(Arc::clone(&self.store), transfer))
            .buffer_unordered(self.concurrency);

        while let Some((transfer, result)) = results.next().await {
            match result {
                Ok(()) => report.success_count += 1,
                Err(e) => {
                    tracing::error!("{} ({}): {e}", transfer.path.display(), transfer.key);
                    report.errors.push((transfer.path.clone(), e));
                }
            }
            on_done(&transfer.path);
        }

        report
    }
}
