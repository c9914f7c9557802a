//! Log output: the console plus a daily-rotated file.
//!
//! The scheduler runs unattended for long stretches and its failures are only
//! visible in the logs, so every event is also written to
//! `<LOG_DIR>/billing-sync.<date>.log`. Thirty files are kept.

use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::errors::{Error, Result};

/// Log directory used when `LOG_DIR` is not set
pub const DEFAULT_LOG_DIR: &str = "logs";

/// File name prefix of the rotated log files
pub const LOG_FILE_PREFIX: &str = "billing-sync";

/// Number of daily log files kept on disk
pub const LOG_RETENTION_DAYS: usize = 30;

/// Resolves the log directory from `LOG_DIR`.
pub fn log_dir_from<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_DIR")
        .filter(|dir| !dir.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_LOG_DIR), PathBuf::from)
}

/// Builds the level filter: `RUST_LOG` wins, then `LOG_LEVEL`, then `info`.
pub fn env_filter_from<F>(lookup: &F) -> EnvFilter
where
    F: Fn(&str) -> Option<String>,
{
    lookup("RUST_LOG")
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| {
            lookup("LOG_LEVEL").and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Opens the daily-rotated log file appender in `dir`, creating it if needed.
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(LOG_RETENTION_DAYS)
        .build(dir)
        .map_err(|e| Error::Config {
            message: format!("Failed to open log directory {}: {e}", dir.display()),
        })
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must live as
/// long as the process. If the log directory is unusable, logging continues
/// on the console only.
pub fn init<F>(lookup: &F) -> Option<WorkerGuard>
where
    F: Fn(&str) -> Option<String>,
{
    let dir = log_dir_from(lookup);
    let (file_layer, guard, failure) = match file_appender(&dir) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(env_filter_from(lookup))
        .with(fmt::layer())
        .with(file_layer)
        .init();

    if let Some(e) = failure {
        warn!(dir = %dir.display(), error = %e, "File logging disabled");
    }
    guard
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_log_dir() {
        assert_eq!(log_dir_from(&lookup_from(&[])), PathBuf::from(DEFAULT_LOG_DIR));
        assert_eq!(
            log_dir_from(&lookup_from(&[("LOG_DIR", "/var/log/billing")])),
            PathBuf::from("/var/log/billing")
        );
    }

    #[test]
    fn test_filter_precedence() {
        let filter = env_filter_from(&lookup_from(&[]));
        assert_eq!(filter.to_string(), "info");

        let filter = env_filter_from(&lookup_from(&[("LOG_LEVEL", "DEBUG")]));
        assert_eq!(filter.to_string(), "debug");

        let filter = env_filter_from(&lookup_from(&[
            ("LOG_LEVEL", "DEBUG"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_file_appender_writes_prefixed_file() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested").join("logs");

        let mut appender = file_appender(&dir).unwrap();
        appender.write_all(b"sync finished\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with(LOG_FILE_PREFIX));
        assert!(names[0].ends_with(".log"));
    }

    #[test]
    fn test_file_appender_rejects_file_as_directory() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let result = file_appender(&blocker);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
