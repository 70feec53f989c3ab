//! Cargo-style progress output for s3archive
//!
//! ```text
//!    Checking /Users/me/Drive/__youtube/2024_Q1/slim-truck-cap
//!   Uploading [=========>               ] 3/8 raw/take2.mov
//!    Archived 8 files (1.21 GiB) in 41.07s
//! ```
//!
//! Console logging goes through [`ProgressWriter`] so log lines don't tear
//! the progress bars.

use std::io::Write as _;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

static MULTI: LazyLock<MultiProgress> = LazyLock::new(MultiProgress::new);

/// Status verbs for cargo-style output (right-aligned to 12 chars)
pub struct Status;

impl Status {
    pub const CHECKING: &str = "Checking";
    pub const UPLOADING: &str = "Uploading";
    pub const DELETING: &str = "Deleting";
    pub const ARCHIVED: &str = "Archived";
    pub const DELETED: &str = "Deleted";
    pub const FRESH: &str = "Fresh";
}

/// Print a cargo-style status line
fn print_status(status: &str, message: &str) {
    MULTI.suspend(|| {
        let mut term = console::Term::stderr();
        let style = console::Style::new().green().bold();
        let _ = writeln!(term, "{:>12} {}", style.apply_to(status), message);
    });
}

/// Log writer that suspends the progress bars while writing
#[derive(Clone, Copy)]
pub struct ProgressWriter;

impl std::io::Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        MULTI.suspend(|| std::io::stderr().write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        *self
    }
}

/// Progress tracker for one directory
pub struct ArchiveProgress {
    start: Instant,
}

impl ArchiveProgress {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Announce the directory being compared against the bucket
    pub fn checking(&self, directory: &Path, bucket: &str) {
        print_status(
            Status::CHECKING,
            &format!("{} against s3://{bucket}", directory.display()),
        );
    }

    /// Nothing to transfer
    pub fn up_to_date(&self) {
        print_status(Status::FRESH, "all files already archived");
    }

    /// Create a progress bar for `total` transfers
    pub fn transfer_bar(&self, verb: &'static str, total: u64) -> ProgressBar {
        let pb = MULTI.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} {msg:>12} [{bar:25.cyan/dim}] {pos}/{len} {prefix:.dim}",
                )
                .expect("valid template")
                .progress_chars("=> "),
        );
        pb.set_message(verb);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Show final summary
    pub fn finish(&self, verb: &str, success_count: u32, error_count: usize, bytes: Option<u64>) {
        let elapsed = self.start.elapsed();
        let elapsed_str = if elapsed.as_secs() >= 1 {
            format!("{:.2}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        };
        let size_str = bytes
            .map(|b| format!(" ({})", humansize::format_size(b, humansize::BINARY)))
            .unwrap_or_default();

        if error_count == 0 {
            print_status(
                verb,
                &format!("{success_count} files{size_str} in {elapsed_str}"),
            );
        } else {
            MULTI.suspend(|| {
                let mut term = console::Term::stderr();
                let style = console::Style::new().yellow().bold();
                let _ = writeln!(
                    term,
                    "{:>12} {} successful, {} failed in {}",
                    style.apply_to("Finished"),
                    success_count,
                    error_count,
                    elapsed_str
                );
            });
        }
    }
}

impl Default for ArchiveProgress {
    fn default() -> Self {
        Self::new()
    }
}
