//! s3archive: incrementally mirror local directories into an S3 bucket
//!
//! - Maps local directories to key prefixes (deepest mapping wins)
//! - Uploads only files missing remotely or changed by size/mtime
//! - Validates the mirror against S3 entity tags, multipart uploads included

mod debug_log;
mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use color_eyre::Result;
use tracing::{debug, error, info};

use s3archive_core::{ArchiveConfig, Comparison, EtagHasher, PathMapper};
use s3archive_transport::{ArchiveMode, ArchiveReport, Archiver, ObjectStore, S3Store};

use crate::progress::{ArchiveProgress, Status};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "s3archive")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Incrementally mirror local directories into an S3 bucket")]
#[command(long_about = r#"
s3archive mirrors local directories into an S3 bucket and checks the mirror.

Each directory is archived incrementally (only new files and files whose size
or modification time changed are uploaded), then validated by comparing
local and remote entity tags. Prints "Archive is valid" or
"Archive is not valid" per directory.

Configuration is read from s3archive.toml and the environment
(AWS_BUCKET_NAME, AWS_ACCESS_KEY, AWS_SECRET_KEY, AWS_REGION, AWS_ENDPOINT;
a .env file is honored).

Examples:
  s3archive                                Archive the configured directories
  s3archive ~/Drive/__youtube/2024_Q1/cut  Archive one directory
  s3archive --dry-run ./footage            List what would be uploaded
"#)]
struct Cli {
    /// Directory to archive (defaults to `directories` from the config)
    directory: Option<PathBuf>,

    /// Config file (default: ./s3archive.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upload every file instead of only changed ones
    #[arg(long)]
    full: bool,

    /// Delete the archived objects of every local file instead of archiving
    #[arg(long, conflicts_with_all = ["full", "dry_run"])]
    delete: bool,

    /// Validate by size and modification time instead of entity tags
    #[arg(long)]
    size_only: bool,

    /// Print the files that would be uploaded as JSON and exit
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn archive_mode(&self) -> ArchiveMode {
        if self.full {
            ArchiveMode::Full
        } else {
            ArchiveMode::Incremental
        }
    }

    fn validation(&self) -> Comparison {
        if self.size_only {
            Comparison::Metadata
        } else {
            Comparison::ContentHash
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // .env first so its values count as environment for logging and config
    let dotenv = dotenvy::dotenv();

    let session = debug_log::init(cli.verbose);
    debug!("Debug log: {}", session.path.display());
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let config = ArchiveConfig::load(cli.config.as_deref())?;
    let directories = select_directories(cli.directory.as_deref(), &config.directories)?;
    session.record_run(config.source.as_deref(), &directories);

    let mapper = PathMapper::from_config(&config.mappings)?;
    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config)?);
    let archiver = Archiver::new(store.clone(), Arc::new(mapper))
        .with_concurrency(config.concurrency)
        .with_excludes(config.exclude.clone())
        .with_hasher(EtagHasher::with_part_size(config.part_size));

    let mut failed = 0usize;
    for directory in &directories {
        if let Err(e) = run_directory(&cli, &archiver, store.bucket(), directory).await {
            error!("{}: {e:#}", directory.display());
            failed += 1;
        }
    }

    if failed > 0 {
        color_eyre::eyre::bail!(
            "{failed} of {} directories failed (log: {})",
            directories.len(),
            session.path.display()
        );
    }

    Ok(())
}

/// The command-line directory if given and non-blank, else the configured
/// list, made absolute so mapping prefixes can match
fn select_directories(arg: Option<&Path>, configured: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let selected = match arg {
        Some(dir) if !dir.as_os_str().to_string_lossy().trim().is_empty() => {
            vec![dir.to_path_buf()]
        }
        _ if configured.is_empty() => color_eyre::eyre::bail!(
            "No directory given and no `directories` configured"
        ),
        _ => configured.to_vec(),
    };

    selected
        .iter()
        .map(|dir| Ok(std::path::absolute(dir)?))
        .collect()
}

async fn run_directory(
    cli: &Cli,
    archiver: &Archiver,
    bucket: &str,
    directory: &Path,
) -> Result<()> {
    let progress = ArchiveProgress::new();
    progress.checking(directory, bucket);

    if cli.delete {
        let files = archiver.local_files(directory)?;
        let pb = progress.transfer_bar(Status::DELETING, files.len() as u64);
        let report = archiver
            .delete_files(files, |path| {
                pb.set_prefix(display_relative(path, directory));
                pb.inc(1);
            })
            .await;
        pb.finish_and_clear();
        progress.finish(Status::DELETED, report.success_count, report.errors.len(), None);
        return Ok(());
    }

    if cli.dry_run {
        let changes = archiver.changes(directory, Comparison::Metadata).await?;
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    let planned = archiver.planned_uploads(directory, cli.archive_mode()).await?;
    if planned.is_empty() {
        progress.up_to_date();
    } else {
        let total_bytes: u64 = planned
            .iter()
            .filter_map(|(path, _)| std::fs::metadata(path).ok())
            .map(|m| m.len())
            .sum();
        info!(
            "{} files to upload ({})",
            planned.len(),
            humansize::format_size(total_bytes, humansize::BINARY)
        );

        let pb = progress.transfer_bar(Status::UPLOADING, planned.len() as u64);
        let report = archiver
            .upload_files(planned, |path| {
                pb.set_prefix(display_relative(path, directory));
                pb.inc(1);
            })
            .await;
        pb.finish_and_clear();
        report_upload(&progress, &report, total_bytes);
    }

    if archiver.is_archive_valid(directory, cli.validation()).await? {
        println!("Archive is valid");
    } else {
        println!("Archive is not valid");
    }

    Ok(())
}

fn report_upload(progress: &ArchiveProgress, report: &ArchiveReport, total_bytes: u64) {
    for (path, e) in &report.errors {
        debug!("Upload failed: {}: {e}", path.display());
    }
    progress.finish(
        Status::ARCHIVED,
        report.success_count,
        report.errors.len(),
        Some(total_bytes),
    );
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["s3archive"]).unwrap();
        assert!(cli.directory.is_none());
        assert_eq!(cli.archive_mode(), ArchiveMode::Incremental);
        assert_eq!(cli.validation(), Comparison::ContentHash);
    }

    #[test]
    fn test_cli_single_directory() {
        let cli = Cli::try_parse_from(["s3archive", "/data/clips", "--full", "--size-only"]).unwrap();
        assert_eq!(cli.directory, Some(PathBuf::from("/data/clips")));
        assert_eq!(cli.archive_mode(), ArchiveMode::Full);
        assert_eq!(cli.validation(), Comparison::Metadata);
    }

    #[test]
    fn test_cli_delete_conflicts_with_full() {
        assert!(Cli::try_parse_from(["s3archive", "--delete", "--full"]).is_err());
    }

    #[test]
    fn test_select_directories() {
        let configured = vec![PathBuf::from("/a"), PathBuf::from("/b")];

        assert_eq!(
            select_directories(Some(Path::new("/c")), &configured).unwrap(),
            vec![PathBuf::from("/c")]
        );
        // Blank argument falls back to the configured list
        assert_eq!(
            select_directories(Some(Path::new("  ")), &configured).unwrap(),
            configured
        );
        assert_eq!(select_directories(None, &configured).unwrap(), configured);
        assert!(select_directories(None, &[]).is_err());
    }

    #[test]
    fn test_select_directories_makes_relative_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let selected = select_directories(Some(Path::new("footage")), &[]).unwrap();
        assert_eq!(selected, vec![cwd.join("footage")]);

        let selected = select_directories(None, &[PathBuf::from("./clips")]).unwrap();
        assert!(selected[0].is_absolute());
        assert!(selected[0].ends_with("clips"));
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(
            display_relative(Path::new("/root/raw/a.mov"), Path::new("/root")),
            "raw/a.mov"
        );
        assert_eq!(display_relative(Path::new("/x/a"), Path::new("/root")), "/x/a");
    }
}
