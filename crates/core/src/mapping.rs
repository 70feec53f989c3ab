//! Local path to remote key translation via longest-prefix directory mappings

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use color_eyre::Result;

use crate::config::MappingConfig;

/// Table of `local directory -> remote key prefix` rules.
///
/// Built once at startup and only read afterwards. Lookups pick the deepest
/// registered directory that contains the queried path, so registration order
/// never matters.
#[derive(Debug, Clone, Default)]
pub struct PathMapper {
    rules: HashMap<PathBuf, String>,
}

impl PathMapper {
    /// Create an empty mapper (every path resolves to itself)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapper from configured `[[mapping]]` entries
    ///
    /// # Errors
    /// Returns an error if any entry has an empty local or remote prefix
    pub fn from_config(mappings: &[MappingConfig]) -> Result<Self> {
        let mut mapper = Self::new();
        for mapping in mappings {
            mapper.add_mapping(&mapping.local, &mapping.remote)?;
        }
        Ok(mapper)
    }

    /// Register a rule mapping `local_prefix` to `remote_prefix`
    ///
    /// Re-registering the same local prefix replaces its remote prefix.
    ///
    /// # Errors
    /// Returns an error if either prefix is empty
    pub fn add_mapping(
        &mut self,
        local_prefix: impl Into<PathBuf>,
        remote_prefix: impl Into<String>,
    ) -> Result<()> {
        let local_prefix = local_prefix.into();
        let remote_prefix = remote_prefix.into();

        if local_prefix.as_os_str().is_empty() {
            color_eyre::eyre::bail!("Directory mapping has an empty local prefix");
        }
        if remote_prefix.is_empty() {
            color_eyre::eyre::bail!(
                "Directory mapping for {} has an empty remote prefix",
                local_prefix.display()
            );
        }

        tracing::debug!("Mapping {} => {remote_prefix}", local_prefix.display());
        self.rules.insert(local_prefix, remote_prefix);
        Ok(())
    }

    /// Number of registered rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if no rules are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Resolve a local path to its remote key.
    ///
    /// The path is rebuilt one component at a time from the root; every
    /// intermediate prefix that is a registered local directory replaces the
    /// previous best match, so the deepest one wins. Paths outside every
    /// mapping are returned unchanged.
    #[must_use]
    pub fn resolve(&self, local_path: &Path) -> String {
        let mut candidate = PathBuf::new();
        let mut best: Option<(&Path, &str)> = None;

        for component in local_path.components() {
            candidate.push(component);
            if let Some((prefix, remote)) = self.rules.get_key_value(&candidate) {
                best = Some((prefix.as_path(), remote.as_str()));
            }
        }

        let Some((prefix, remote)) = best else {
            return local_path.to_string_lossy().into_owned();
        };

        // `prefix` matched component-wise, so stripping it cannot fail
        let suffix = local_path
            .strip_prefix(prefix)
            .map(join_key_segments)
            .unwrap_or_default();

        let remote = remote.trim_end_matches('/');
        if suffix.is_empty() {
            remote.to_string()
        } else if remote.is_empty() {
            suffix
        } else {
            format!("{remote}/{suffix}")
        }
    }
}

/// Join the normal components of a relative path with `/`
fn join_key_segments(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(segment) => Some(segment.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
