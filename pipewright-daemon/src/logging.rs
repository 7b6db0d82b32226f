//! Tracing setup: human-readable lines on stderr, JSON lines appended to
//! `logs/pipeline.log`.
//!
//! At startup an oversized `pipeline.log` is archived as
//! `logs/pipeline.<YYYYMMDD_HHMMSS>.log` and only the newest archives are kept.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use pipewright_core::layout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
///
/// Without a writable log file only the stderr layer is installed. A second
/// call is a no-op.
pub fn init_tracing(root: Option<&Path>, verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let file_layer = root.and_then(open_log_file).map(|file| {
        fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_target(true)
            .with_current_span(false)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();
}

/// The live log is archived once it reaches this size.
const ARCHIVE_AT_BYTES: u64 = 10 * 1024 * 1024;

const KEEP_ARCHIVES: usize = 5;

fn open_log_file(root: &Path) -> Option<File> {
    let path = layout::pipeline_log_path(root);
    // The subscriber is not installed yet, so problems go straight to stderr.
    match archive_if_oversized(&path, ARCHIVE_AT_BYTES, KEEP_ARCHIVES) {
        Ok(Some(archive)) => eprintln!("archived {} as {}", path.display(), archive.display()),
        Ok(None) => {}
        Err(err) => eprintln!("cannot archive {}: {err}", path.display()),
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok()?;
    }
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("cannot open {}: {err}; logging to stderr only", path.display());
            None
        }
    }
}

/// Move `log` aside when it has reached `limit` bytes, then prune archives
/// down to the newest `keep`. Returns the archive path, if one was written.
fn archive_if_oversized(log: &Path, limit: u64, keep: usize) -> io::Result<Option<PathBuf>> {
    match fs::metadata(log) {
        Ok(meta) if meta.len() >= limit => {}
        Ok(_) => return Ok(None),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    }

    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let mut archive = archive_path(log, &stamp);
    let mut n = 1;
    while archive.exists() {
        archive = archive_path(log, &format!("{stamp}_{n}"));
        n += 1;
    }
    fs::rename(log, &archive)?;

    let archives = archives_of(log)?;
    let excess = archives.len().saturating_sub(keep);
    for old in &archives[..excess] {
        fs::remove_file(old)?;
    }
    Ok(Some(archive))
}

fn log_stem(log: &Path) -> &str {
    log.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("pipeline")
}

fn archive_path(log: &Path, tag: &str) -> PathBuf {
    log.with_file_name(format!("{}.{tag}.log", log_stem(log)))
}

/// Archives of `log`, oldest first.
fn archives_of(log: &Path) -> io::Result<Vec<PathBuf>> {
    let Some(dir) = log.parent() else {
        return Ok(Vec::new());
    };
    let prefix = format!("{}.", log_stem(log));
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let is_archive = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".log"))
            .is_some_and(|tag| tag.starts_with(|c: char| c.is_ascii_digit()));
        if is_archive {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn live_log(dir: &TempDir, bytes: usize) -> PathBuf {
        let path = dir.path().join("pipeline.log");
        fs::write(&path, vec![b'x'; bytes]).unwrap();
        path
    }

    #[test]
    fn small_log_stays_live() {
        let dir = TempDir::new().unwrap();
        let log = live_log(&dir, 100);
        assert_eq!(archive_if_oversized(&log, 4096, 5).unwrap(), None);
        assert!(log.exists());
        assert!(archives_of(&log).unwrap().is_empty());
    }

    #[test]
    fn oversized_log_is_archived_with_a_timestamp() {
        let dir = TempDir::new().unwrap();
        let log = live_log(&dir, 4096);
        let archive = archive_if_oversized(&log, 4096, 5).unwrap().unwrap();
        assert!(!log.exists());
        assert_eq!(fs::metadata(&archive).unwrap().len(), 4096);
        let name = archive.file_name().unwrap().to_str().unwrap();
        // pipeline.YYYYMMDD_HHMMSS.log
        assert_eq!(name.len(), "pipeline.".len() + 15 + ".log".len(), "{name}");
    }

    #[test]
    fn oldest_archives_are_pruned_and_other_files_kept() {
        let dir = TempDir::new().unwrap();
        for day in 1..=3 {
            fs::write(dir.path().join(format!("pipeline.2020010{day}_000000.log")), "old").unwrap();
        }
        fs::write(dir.path().join("other.log"), "unrelated").unwrap();
        let log = live_log(&dir, 64);

        let archive = archive_if_oversized(&log, 64, 2).unwrap().unwrap();
        let kept = archives_of(&log).unwrap();
        assert_eq!(kept, vec![dir.path().join("pipeline.20200103_000000.log"), archive]);
        assert!(dir.path().join("other.log").exists());
    }

    #[test]
    fn same_second_archives_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let log = live_log(&dir, 64);
        let first = archive_if_oversized(&log, 64, 5).unwrap().unwrap();
        fs::write(&log, "y".repeat(64)).unwrap();
        let second = archive_if_oversized(&log, 64, 5).unwrap().unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("pipeline.log");
        assert_eq!(archive_if_oversized(&log, 1, 5).unwrap(), None);
    }

    #[test]
    fn log_file_is_created_under_logs() {
        let dir = TempDir::new().unwrap();
        assert!(open_log_file(dir.path()).is_some());
        assert!(layout::pipeline_log_path(dir.path()).exists());
    }
}
