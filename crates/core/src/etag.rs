//! S3-compatible entity tags: plain MD5 and multipart `md5-of-md5s-N`

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default multipart part size (8 MiB), the threshold used by the reference
/// S3 clients when they switch to multipart uploads.
pub const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;

/// Separator between the digest and the part count of a multipart tag
const PART_SEPARATOR: char = '-';

/// An entity tag as reported by the object store, without surrounding quotes
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTag(String);

impl EntityTag {
    /// Parse a tag, stripping the quote characters S3 wraps it in
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(raw.trim().trim_matches('"').to_string())
    }

    /// Whether the object was stored as a multipart upload
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.0.contains(PART_SEPARATOR)
    }

    /// Number of parts encoded in a multipart tag
    #[must_use]
    pub fn part_count(&self) -> Option<usize> {
        let (_, count) = self.0.rsplit_once(PART_SEPARATOR)?;
        count.parse().ok()
    }

    /// The tag text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityTag({})", self.0)
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for EntityTag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Computes local entity tags that reproduce the object store's convention
#[derive(Debug, Clone, Copy)]
pub struct EtagHasher {
    part_size: usize,
}

impl Default for EtagHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl EtagHasher {
    /// Create a hasher using the default 8 MiB part size
    #[must_use]
    pub fn new() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Create with a custom part size
    #[must_use]
    pub fn with_part_size(part_size: usize) -> Self {
        Self {
            part_size: part_size.max(1),
        }
    }

    /// Part size used for multipart tags
    #[must_use]
    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Compute the local tag for `path` in the same shape as `remote`.
    ///
    /// A single-part remote tag is compared against the whole-file MD5; a
    /// multipart one against the MD5 of the concatenated per-part MD5s
    /// followed by `-<part count>`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn matching(&self, path: &Path, remote: &EntityTag) -> io::Result<EntityTag> {
        if remote.is_multipart() {
            self.multipart(path)
        } else {
            Self::single(path)
        }
    }

    /// Whole-file MD5 as lower-case hex
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn single(path: &Path) -> io::Result<EntityTag> {
        let mut file = File::open(path)?;
        let mut context = md5::Context::new();
        let mut buffer = vec![0u8; 64 * 1024];

        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            context.consume(&buffer[..bytes_read]);
        }

        Ok(EntityTag(hex::encode(context.compute().0)))
    }

    /// Multipart tag: MD5 over the raw per-part digests plus the part count.
    ///
    /// An empty file has zero parts.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read
    pub fn multipart(&self, path: &Path) -> io::Result<EntityTag> {
        let mut file = File::open(path)?;
        let mut buffer = vec![0u8; self.part_size];
        let mut digests = Vec::new();
        let mut parts = 0usize;

        loop {
            let filled = read_part(&mut file, &mut buffer)?;
            if filled == 0 {
                break;
            }
            digests.extend_from_slice(&md5::compute(&buffer[..filled]).0);
            parts += 1;
            if filled < buffer.len() {
                break;
            }
        }

        Ok(Self::combine(&digests, parts))
    }

    /// Multipart tag for in-memory data, split into parts of the configured size
    #[must_use]
    pub fn multipart_bytes(&self, data: &[u8]) -> EntityTag {
        let mut digests = Vec::new();
        let mut parts = 0usize;
        for part in data.chunks(self.part_size) {
            digests.extend_from_slice(&md5::compute(part).0);
            parts += 1;
        }
        Self::combine(&digests, parts)
    }

    /// Plain MD5 tag for in-memory data
    #[must_use]
    pub fn single_bytes(data: &[u8]) -> EntityTag {
        EntityTag(hex::encode(md5::compute(data).0))
    }

    fn combine(digests: &[u8], parts: usize) -> EntityTag {
        let combined = md5::compute(digests);
        EntityTag(format!(
            "{}{PART_SEPARATOR}{parts}",
            hex::encode(combined.0)
        ))
    }
}

/// Fill `buffer` from `reader`, stopping early only at end of file
fn read_part(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn md5_hex(data: &[u8]) -> String {
        hex::encode(md5::compute(data).0)
    }

    fn expected_multipart(data: &[u8], part_size: usize) -> String {
        let mut digests = Vec::new();
        let mut parts = 0;
        for part in data.chunks(part_size) {
            digests.extend_from_slice(&md5::compute(part).0);
            parts += 1;
        }
        format!("{}-{parts}", md5_hex(&digests))
    }

    #[test]
    fn test_parse_strips_quotes() {
        let tag = EntityTag::parse("\"9b2cf535f27731c974343645a3985328-3\"");
        assert_eq!(tag.as_str(), "9b2cf535f27731c974343645a3985328-3");
        assert!(tag.is_multipart());
        assert_eq!(tag.part_count(), Some(3));

        let plain = EntityTag::parse("\"d41d8cd98f00b204e9800998ecf8427e\"");
        assert!(!plain.is_multipart());
        assert_eq!(plain.part_count(), None);
    }

    #[test]
    fn test_single_is_plain_md5() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.bin");
        fs::write(&path, b"hello world").unwrap();

        let remote = EntityTag::parse("\"0123456789abcdef0123456789abcdef\"");
        let tag = EtagHasher::new().matching(&path, &remote).unwrap();
        assert_eq!(tag, EntityTag(md5_hex(b"hello world")));
        // Known vector
        assert_eq!(tag.as_str(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_empty_file_single_part() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        let tag = EtagHasher::single(&path).unwrap();
        assert_eq!(tag.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_empty_file_multipart_has_zero_parts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        let tag = EtagHasher::new().multipart(&path).unwrap();
        assert_eq!(tag.as_str(), format!("{}-0", md5_hex(b"")));
    }

    #[test]
    fn test_multipart_with_remainder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let hasher = EtagHasher::with_part_size(1000);
        let remote = EntityTag::parse("\"abc-3\"");
        let tag = hasher.matching(&path, &remote).unwrap();

        assert_eq!(tag.as_str(), expected_multipart(&data, 1000));
        assert_eq!(tag.part_count(), Some(3));
    }

    #[test]
    fn test_multipart_exact_multiple() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data = vec![7u8; 3000];
        fs::write(&path, &data).unwrap();

        let tag = EtagHasher::with_part_size(1000).multipart(&path).unwrap();
        assert_eq!(tag.as_str(), expected_multipart(&data, 1000));
        assert_eq!(tag.part_count(), Some(3));
    }

    #[test]
    fn test_default_part_size_matches_reference_client() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large.bin");
        let data: Vec<u8> = (0..DEFAULT_PART_SIZE + 10).map(|i| (i % 97) as u8).collect();
        fs::write(&path, &data).unwrap();

        let tag = EtagHasher::new().multipart(&path).unwrap();
        assert_eq!(tag.part_count(), Some(2));
        assert_eq!(tag.as_str(), expected_multipart(&data, DEFAULT_PART_SIZE));
    }

    #[test]
    fn test_bytes_and_file_agree() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data = b"abcdefghij".repeat(55);
        fs::write(&path, &data).unwrap();

        let hasher = EtagHasher::with_part_size(128);
        assert_eq!(hasher.multipart(&path).unwrap(), hasher.multipart_bytes(&data));
        assert_eq!(
            EtagHasher::single(&path).unwrap(),
            EtagHasher::single_bytes(&data)
        );
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(EtagHasher::single(&missing).is_err());
        assert!(EtagHasher::new().multipart(&missing).is_err());
    }
}
