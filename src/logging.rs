//! Tracing subscriber setup.
//!
//! Logs go to stderr by default so stdout stays clean for command output.
//! A log file keeps the last few runs as numbered generations.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "toolgate=info,warn";

/// Rotated log files kept next to the active one.
const KEEP_ROTATED: u32 = 3;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed or the log file cannot be
/// opened.
pub fn init_tracing(
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (writer, ansi) = match log_file {
        // `File` is unbuffered, so each event reaches the disk as it is written
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(path)?)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(false);

    match format {
        LogFormat::Text => builder.with_ansi(ansi).try_init()?,
        LogFormat::Json => builder.json().try_init()?,
    }

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        log_file = ?log_file,
        "logging initialized"
    );
    Ok(())
}

/// Shift earlier generations aside and open a fresh `path` for appending.
fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // best effort; missing generations are skipped
    let _ = fs::remove_file(generation(path, KEEP_ROTATED));
    for n in (1..KEEP_ROTATED).rev() {
        let _ = fs::rename(generation(path, n), generation(path, n + 1));
    }
    let _ = fs::rename(path, generation(path, 1));

    OpenOptions::new().create(true).append(true).open(path)
}

/// `toolgate.log` → `toolgate.log.<n>`.
fn generation(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn test_open_rotates_previous_generations() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("toolgate.log");
        fs::write(&base, "current").unwrap();
        fs::write(generation(&base, 1), "one").unwrap();
        fs::write(generation(&base, 3), "three").unwrap();

        let file = open_log_file(&base).unwrap();
        drop(file);

        assert_eq!(fs::read_to_string(&base).unwrap(), "");
        assert_eq!(fs::read_to_string(generation(&base, 1)).unwrap(), "current");
        assert_eq!(fs::read_to_string(generation(&base, 2)).unwrap(), "one");
        assert!(!generation(&base, 3).exists());
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("toolgate.log");

        let writer = Mutex::new(open_log_file(&path).unwrap());
        writer.make_writer().write_all(b"line one\n").unwrap();
        writer.make_writer().write_all(b"line two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "line one\nline two\n");
    }
}
