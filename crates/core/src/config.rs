//! Archive configuration (s3archive.toml + environment)

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::etag::DEFAULT_PART_SIZE;

/// Config file name looked up in the working directory
pub const CONFIG_FILE: &str = "s3archive.toml";

/// Environment variable holding the bucket name
pub const ENV_BUCKET: &str = "AWS_BUCKET_NAME";
/// Environment variable holding the access key id
pub const ENV_ACCESS_KEY: &str = "AWS_ACCESS_KEY";
/// Environment variable holding the secret access key
pub const ENV_SECRET_KEY: &str = "AWS_SECRET_KEY";
/// Environment variable overriding the region
pub const ENV_REGION: &str = "AWS_REGION";
/// Environment variable overriding the endpoint
pub const ENV_ENDPOINT: &str = "AWS_ENDPOINT";

/// Default number of concurrent uploads
pub const DEFAULT_CONCURRENCY: usize = 5;

/// s3archive configuration
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Bucket to mirror into
    pub bucket: String,
    /// Access key id
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Bucket region
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...); AWS regional endpoint when unset
    pub endpoint: Option<String>,
    /// Use path-style addressing instead of virtual-hosted buckets
    pub path_style: bool,
    /// Maximum number of concurrent uploads or deletes
    pub concurrency: usize,
    /// Directories archived when none is given on the command line
    pub directories: Vec<PathBuf>,
    /// Local directory to remote prefix rules
    #[serde(rename = "mapping")]
    pub mappings: Vec<MappingConfig>,
    /// Glob patterns never mirrored
    pub exclude: Vec<String>,
    /// Multipart part size (bytes) assumed when recomputing entity tags
    pub part_size: usize,
    /// File the config was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// One `[[mapping]]` rule
#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    /// Local directory
    pub local: PathBuf,
    /// Remote key prefix
    pub remote: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            region: default_region(),
            endpoint: None,
            path_style: false,
            concurrency: DEFAULT_CONCURRENCY,
            directories: Vec::new(),
            mappings: Vec::new(),
            exclude: Vec::new(),
            part_size: DEFAULT_PART_SIZE,
            source: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl ArchiveConfig {
    /// Load config from `path`, or from `s3archive.toml` in the working
    /// directory when no path is given, then apply environment overrides.
    ///
    /// A missing default config file yields the default config; a missing
    /// explicit one is an error.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting config is incomplete.
    pub fn load(path: Option<&Path>) -> color_eyre::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without environment overrides
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.source = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Override fields from the environment; empty values are ignored
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = get(ENV_BUCKET) {
            self.bucket = bucket;
        }
        if let Some(access_key) = get(ENV_ACCESS_KEY) {
            self.access_key = access_key;
        }
        if let Some(secret_key) = get(ENV_SECRET_KEY) {
            self.secret_key = secret_key;
        }
        if let Some(region) = get(ENV_REGION) {
            self.region = region;
        }
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
    }

    /// Check that the config can drive an archive run
    ///
    /// # Errors
    /// Returns an error naming the first missing setting
    pub fn validate(&self) -> color_eyre::Result<()> {
        if self.bucket.is_empty() {
            color_eyre::eyre::bail!("No bucket configured (set {ENV_BUCKET} or `bucket`)");
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            color_eyre::eyre::bail!(
                "Missing credentials (set {ENV_ACCESS_KEY} and {ENV_SECRET_KEY})"
            );
        }
        if self.concurrency == 0 {
            color_eyre::eyre::bail!("`concurrency` must be at least 1");
        }
        if self.part_size == 0 {
            color_eyre::eyre::bail!("`part_size` must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
bucket = "archive"
region = "eu-west-1"
endpoint = "http://localhost:9000"
path_style = true
concurrency = 8
directories = ["/Users/me/Drive/__youtube/2024_Q1/a", "/Users/me/Drive/__youtube/2024_Q1/b"]
exclude = [".DS_Store"]
part_size = 16777216

[[mapping]]
local = "/Users/me/Drive/__youtube"
remote = "youtube"

[[mapping]]
local = "/Users/me/Dropbox/_youtube"
remote = "youtube"
"#;

        let config: ArchiveConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.bucket, "archive");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
        assert!(config.path_style);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.directories.len(), 2);
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[1].remote, "youtube");
        assert_eq!(config.exclude, vec![".DS_Store".to_string()]);
        assert_eq!(config.part_size, 16 * 1024 * 1024);
        assert!(config.source.is_none());
    }

    #[test]
    fn test_parse_empty_config() {
        let config: ArchiveConfig = toml::from_str("").unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.part_size, DEFAULT_PART_SIZE);
        assert!(config.endpoint.is_none());
        assert!(config.mappings.is_empty());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config: ArchiveConfig = toml::from_str(r#"bucket = "from-file""#).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_BUCKET, "from-env"),
            (ENV_ACCESS_KEY, "AKIA"),
            (ENV_SECRET_KEY, "secret"),
            (ENV_REGION, "  "),
        ]
        .into_iter()
        .collect();

        config.apply_env(|name| env.get(name).map(|v| (*v).to_string()));
        assert_eq!(config.bucket, "from-env");
        assert_eq!(config.access_key, "AKIA");
        assert_eq!(config.secret_key, "secret");
        // Blank values don't override
        assert_eq!(config.region, "us-east-1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_bucket_and_credentials() {
        let mut config = ArchiveConfig::default();
        assert!(config.validate().is_err());

        config.bucket = "b".to_string();
        assert!(config.validate().is_err());

        config.access_key = "a".to_string();
        config.secret_key = "s".to_string();
        assert!(config.validate().is_ok());

        config.concurrency = 0;
        assert!(config.validate().is_err());

        config.concurrency = 1;
        config.part_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_records_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "bucket = \"archive\"\n").unwrap();

        let config = ArchiveConfig::from_file(&path).unwrap();
        assert_eq!(config.bucket, "archive");
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
    }
}
