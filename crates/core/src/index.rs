//! Remote index: a point-in-time view of the objects under a key prefix

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::etag::EntityTag;

/// Metadata for a single remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectRecord {
    /// Full object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modification time reported by the store
    pub last_modified: DateTime<Utc>,
    /// Entity tag as reported, usually quoted
    pub e_tag: String,
}

impl RemoteObjectRecord {
    /// The entity tag with quotes stripped
    #[must_use]
    pub fn entity_tag(&self) -> EntityTag {
        EntityTag::parse(&self.e_tag)
    }
}

/// Snapshot of the remote objects under a prefix, keyed by full key.
///
/// Built once per comparison pass and never updated; re-list to refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteIndex {
    prefix: String,
    objects: HashMap<String, RemoteObjectRecord>,
}

impl RemoteIndex {
    /// Create an index from listed records
    #[must_use]
    pub fn from_records(
        prefix: impl Into<String>,
        records: impl IntoIterator<Item = RemoteObjectRecord>,
    ) -> Self {
        let objects = records.into_iter().map(|r| (r.key.clone(), r)).collect();
        Self {
            prefix: prefix.into(),
            objects,
        }
    }

    /// Create an empty index
    #[must_use]
    pub fn empty(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            objects: HashMap::new(),
        }
    }

    /// Prefix the index was listed under
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Get the number of objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Look up an object by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RemoteObjectRecord> {
        self.objects.get(key)
    }

    /// Check whether a key is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Total size of all indexed objects
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.objects.values().map(|r| r.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, size: u64) -> RemoteObjectRecord {
        RemoteObjectRecord {
            key: key.to_string(),
            size,
            last_modified: Utc::now(),
            e_tag: "\"d41d8cd98f00b204e9800998ecf8427e\"".to_string(),
        }
    }

    #[test]
    fn test_lookup_by_full_key() {
        let index = RemoteIndex::from_records(
            "youtube",
            vec![record("youtube/a.mov", 10), record("youtube/b/c.mov", 20)],
        );

        assert_eq!(index.len(), 2);
        assert_eq!(index.prefix(), "youtube");
        assert_eq!(index.get("youtube/b/c.mov").map(|r| r.size), Some(20));
        assert!(index.contains("youtube/a.mov"));
        assert!(!index.contains("a.mov"));
        assert_eq!(index.total_size(), 30);
    }

    #[test]
    fn test_empty_index() {
        let index = RemoteIndex::empty("x");
        assert!(index.is_empty());
        assert!(index.get("x/a").is_none());
        assert_eq!(index.total_size(), 0);
    }

    #[test]
    fn test_entity_tag_unquoted() {
        let r = record("k", 0);
        assert_eq!(r.entity_tag().as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
