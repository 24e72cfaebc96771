//! Daily log files.
//!
//! Each run appends to `<dir>/YYYY-MM-DD.log`, named for the local date the
//! process started on. Terminal output stays on stderr; the file also keeps
//! this crate's debug events.

use crate::error::{ExplorerError, ExplorerResult};
use chrono::{Local, NaiveDate};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;

pub fn log_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.log", date.format("%Y-%m-%d")))
}

/// Open today's log file for appending, creating the directory if needed.
pub fn open_daily_log(dir: &Path) -> ExplorerResult<(PathBuf, File)> {
    std::fs::create_dir_all(dir).map_err(|e| {
        ExplorerError::config(format!("Cannot create log directory {}: {}", dir.display(), e))
    })?;

    let path = log_file_path(dir, Local::now().date_naive());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ExplorerError::config(format!("Cannot open log file {}: {}", path.display(), e)))?;
    Ok((path, file))
}

/// Debug for this crate, info for dependencies.
pub fn file_filter() -> Targets {
    Targets::new()
        .with_target(env!("CARGO_CRATE_NAME"), LevelFilter::DEBUG)
        .with_default(LevelFilter::INFO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_log_file_path_uses_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            log_file_path(Path::new("Logs"), date),
            PathBuf::from("Logs/2024-03-07.log")
        );
    }

    #[test]
    fn test_open_daily_log_creates_dir_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("Logs");

        let (path, mut file) = open_daily_log(&log_dir).unwrap();
        assert_eq!(path, log_file_path(&log_dir, Local::now().date_naive()));
        writeln!(file, "first").unwrap();
        drop(file);

        let (_, mut file) = open_daily_log(&log_dir).unwrap();
        writeln!(file, "second").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_file_filter_levels() {
        let filter = file_filter();
        assert!(filter.would_enable("sql_explorer::pipeline", &tracing::Level::DEBUG));
        assert!(!filter.would_enable("sqlx::query", &tracing::Level::DEBUG));
        assert!(filter.would_enable("sqlx::query", &tracing::Level::INFO));
    }
}
