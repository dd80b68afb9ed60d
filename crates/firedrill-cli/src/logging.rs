use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const MAX_LOG_SIZE: u64 = 1024 * 1024; // 1MB

/// Filter used when `RUST_LOG` is not set
///
/// Each `-d` on the command line lowers the default level by one step.
pub fn default_filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize logging for a component.
///
/// - `component_name`: Name of the log file without extension
/// - `to_file`: Also write to a file in the data directory
/// - `verbosity`: Default level when `RUST_LOG` is unset
///
/// Returns a guard that must be kept alive for the duration of the program.
pub fn init_logging(
    component_name: &str,
    to_file: bool,
    verbosity: u8,
) -> io::Result<Option<WorkerGuard>> {
    if !to_file {
        // Console-only logging
        tracing_subscriber::fmt()
            .with_env_filter(default_filter(verbosity))
            .with_writer(io::stderr)
            .init();
        return Ok(None);
    }

    let log_dir = log_directory()?;
    fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join(format!("{}.log", component_name));
    truncate_if_needed(&log_path)?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let (non_blocking_file, guard) = tracing_appender::non_blocking(BufWriter::new(file));

    tracing_subscriber::registry()
        .with(default_filter(verbosity))
        .with(fmt::layer().with_writer(io::stderr).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    tracing::info!("Logging to file: {}", log_path.display());

    Ok(Some(guard))
}

/// Directory log files are written to
pub fn log_directory() -> io::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "firedrill")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to find home directory"))?;

    Ok(dirs.data_dir().join("logs"))
}

/// Truncate a log file that grew past MAX_LOG_SIZE
fn truncate_if_needed(log_path: &Path) -> io::Result<()> {
    if log_path.exists() && fs::metadata(log_path)?.len() > MAX_LOG_SIZE {
        let file = File::create(log_path)?;
        file.set_len(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_large_log_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firedrill.log");

        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![b'x'; MAX_LOG_SIZE as usize + 1]).unwrap();
        drop(file);

        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_small_log_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firedrill.log");
        fs::write(&path, "hello").unwrap();

        truncate_if_needed(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");

        // Missing files are fine too
        truncate_if_needed(&dir.path().join("missing.log")).unwrap();
    }
}
