//! Session logging for s3archive
//!
//! Every run gets a UUID and a log file at `<tmp>/s3archive-<uuid>.log`.
//! The file records our own crates at DEBUG (TRACE with `-v`, or whatever
//! `RUST_LOG` says); the console shows INFO (DEBUG with `-v`) through the
//! progress writer.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use uuid::Uuid;

use crate::progress;

const CRATES: [&str; 3] = ["s3archive", "s3archive_core", "s3archive_transport"];

/// One run's log file; dropping it flushes and closes the file
pub struct LogSession {
    pub id: Uuid,
    pub path: PathBuf,
    _guard: WorkerGuard,
}

impl LogSession {
    /// Write what this run is working with to the log file
    pub fn record_run(&self, config_source: Option<&Path>, directories: &[PathBuf]) {
        tracing::debug!(
            "s3archive {} session {} (config: {})",
            env!("CARGO_PKG_VERSION"),
            self.id,
            config_source.map_or_else(|| "environment only".to_string(), |p| p.display().to_string())
        );
        for directory in directories {
            tracing::debug!("Queued {}", directory.display());
        }
    }
}

fn log_file_name(id: Uuid) -> String {
    format!("s3archive-{id}.log")
}

/// Default file filter: warnings from dependencies, our crates in detail
fn file_directives(verbose: bool) -> String {
    let level = if verbose { "trace" } else { "debug" };
    std::iter::once("warn".to_string())
        .chain(CRATES.iter().map(|krate| format!("{krate}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

fn console_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Install the file and console layers.
///
/// Keep the returned session alive until exit or buffered lines are lost.
pub fn init(verbose: bool) -> LogSession {
    let id = Uuid::new_v4();
    let dir = std::env::temp_dir();
    let name = log_file_name(id);
    let path = dir.join(&name);

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, &name));

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(file_directives(verbose)));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(file_filter);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(progress::ProgressWriter)
        .with_target(false)
        .with_filter(console_level(verbose));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    LogSession {
        id,
        path,
        _guard: guard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_directives_follow_verbosity() {
        assert_eq!(
            file_directives(false),
            "warn,s3archive=debug,s3archive_core=debug,s3archive_transport=debug"
        );
        assert_eq!(
            file_directives(true),
            "warn,s3archive=trace,s3archive_core=trace,s3archive_transport=trace"
        );
        assert!(EnvFilter::try_new(file_directives(true)).is_ok());
    }

    #[test]
    fn test_console_level() {
        assert_eq!(console_level(false), LevelFilter::INFO);
        assert_eq!(console_level(true), LevelFilter::DEBUG);
    }

    #[test]
    fn test_log_file_name_carries_session_id() {
        let id = Uuid::nil();
        assert_eq!(
            log_file_name(id),
            "s3archive-00000000-0000-0000-0000-000000000000.log"
        );
    }
}
