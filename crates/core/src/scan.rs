//! Directory walking via the `ignore` crate

use std::path::{Path, PathBuf};

use color_eyre::Result;
use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};

/// Recursive file walker for a local directory.
///
/// Unlike a source-tree walker, every file is mirrored: hidden files and
/// files matched by `.gitignore` are included. Only explicit exclude globs
/// filter the walk.
pub struct Scanner {
    root: PathBuf,
    /// Glob patterns (relative to root) to leave out of the walk
    excludes: Vec<String>,
}

impl Scanner {
    /// Create a new scanner for the given root directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excludes: Vec::new(),
        }
    }

    /// Leave files matching any of `patterns` out of the walk
    #[must_use]
    pub fn excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Root directory of the walk
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn exclude_matcher(&self) -> Result<Option<Override>> {
        if self.excludes.is_empty() {
            return Ok(None);
        }

        let mut overrides = OverrideBuilder::new(&self.root);
        for pattern in &self.excludes {
            // Overrides whitelist by default; a leading `!` turns the glob into an ignore
            overrides.add(&format!("!{pattern}"))?;
        }
        Ok(Some(overrides.build()?))
    }

    fn walk_builder(&self) -> Result<WalkBuilder> {
        let mut builder = WalkBuilder::new(&self.root);
        builder.standard_filters(false).follow_links(false);

        if let Some(matcher) = self.exclude_matcher()? {
            builder.overrides(matcher);
        }

        Ok(builder)
    }

    /// Walk the directory and return the paths of all regular files, sorted.
    ///
    /// Returned paths are the root joined with the file's relative path.
    /// Entries that cannot be read are logged and skipped.
    ///
    /// # Errors
    /// Returns an error if the root is not a directory or an exclude pattern
    /// is not a valid glob
    pub fn scan_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            color_eyre::eyre::bail!("{} is not a directory", self.root.display());
        }

        let mut paths = Vec::new();

        for result in self.walk_builder()?.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {e}", self.root.display());
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            paths.push(path.to_path_buf());
        }

        paths.sort();
        Ok(paths)
    }
}
