//! Report store: one JSON file per completed gate / agent / phase run.
//!
//! ## Layout
//!
//! ```text
//! <project>/reports/
//!   agents/agent_<id>_<YYYYMMDD_HHMMSS>.json
//!   validations/validation_<id>_<YYYYMMDD_HHMMSS>.json
//!   phases/phase_<id>_<YYYYMMDD_HHMMSS>.json
//! ```
//!
//! ## `record`: write protocol
//!
//! 1. Serialize the payload (pretty JSON) and hash it (SHA-256).
//! 2. Write a uniquely named dot-tmp file in the kind directory, `fsync` it.
//! 3. Hard-link the tmp file to `<stem>.json`. Linking never clobbers: if the
//!    name exists (same kind + id in the same second), retry with `<stem>_1`,
//!    `<stem>_2`, … until a free name is claimed.
//! 4. Remove the tmp file and `fsync` the directory.
//!
//! A report is therefore either fully on disk under its final name, or absent.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, PersistenceError};

const MAX_NAME_ATTEMPTS: usize = 10_000;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Kinds and handles
// ---------------------------------------------------------------------------

/// Category of a stored report; decides directory and file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Agent,
    Validation,
    Phase,
}

impl ReportKind {
    pub fn all() -> &'static [ReportKind] {
        &[ReportKind::Agent, ReportKind::Validation, ReportKind::Phase]
    }

    pub fn dir_name(&self) -> &'static str {
        match self {
            ReportKind::Agent => "agents",
            ReportKind::Validation => "validations",
            ReportKind::Phase => "phases",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ReportKind::Agent => "agent",
            ReportKind::Validation => "validation",
            ReportKind::Phase => "phase",
        }
    }
}

/// Receipt for a persisted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHandle {
    pub kind: ReportKind,
    pub id: String,
    pub path: PathBuf,
    pub recorded_at: DateTime<Utc>,
    /// Hex SHA-256 of the bytes written to `path`.
    pub sha256: String,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Append-only report store rooted at `<project>/reports`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    /// Store rooted at `reports_root` (usually `<project>/reports`).
    pub fn new(reports_root: impl Into<PathBuf>) -> Self {
        Self {
            root: reports_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: ReportKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    /// Persist `payload` as a new report. Durable before this returns.
    pub fn record<T: Serialize + ?Sized>(
        &self,
        kind: ReportKind,
        id: &str,
        payload: &T,
    ) -> Result<ReportHandle, PersistenceError> {
        let bytes = serde_json::to_vec_pretty(payload)?;
        let sha256 = digest(&bytes);

        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

        let recorded_at = Utc::now();
        let stem = format!(
            "{}_{}_{}",
            kind.prefix(),
            sanitize_id(id),
            recorded_at.format("%Y%m%d_%H%M%S")
        );

        let tmp = dir.join(format!(
            ".{stem}.{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        write_synced(&tmp, &bytes)?;

        let claimed = claim_name(&dir, &stem, &tmp);
        let _ = fs::remove_file(&tmp);
        let path = claimed?;
        sync_dir(&dir)?;

        tracing::debug!(kind = kind.prefix(), id, path = %path.display(), "report recorded");
        Ok(ReportHandle {
            kind,
            id: id.to_string(),
            path,
            recorded_at,
            sha256,
        })
    }

    /// Raw bytes of a stored report.
    pub fn read_bytes(&self, handle: &ReportHandle) -> Result<Vec<u8>, PersistenceError> {
        fs::read(&handle.path).map_err(|e| io_err(&handle.path, e))
    }

    /// Decode a stored report.
    pub fn load<T: DeserializeOwned>(&self, handle: &ReportHandle) -> Result<T, PersistenceError> {
        self.load_path(&handle.path)
    }

    /// Decode the report at `path`.
    pub fn load_path<T: DeserializeOwned>(&self, path: &Path) -> Result<T, PersistenceError> {
        let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Decode {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// All report files of `kind`, in name order with same-second tie-breaks
    /// in write order (`x.json`, `x_1.json`, `x_2.json`, …, `x_10.json`).
    pub fn list(&self, kind: ReportKind) -> Result<Vec<PathBuf>, PersistenceError> {
        let dir = self.kind_dir(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&dir, err)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort_by_cached_key(|path| report_order(path));
        Ok(paths)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// `(stem, n)` for `{stem}_{n}.json`, `(stem, 0)` for the first file of a second.
fn report_order(path: &Path) -> (String, u32) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    let mut parts = stem.rsplitn(4, '_');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(n), Some(time), Some(date))
            if is_digits(time, 6) && is_digits(date, 8) && n.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let base = &stem[..stem.len() - n.len() - 1];
            (base.to_string(), n.parse().unwrap_or(u32::MAX))
        }
        _ => (stem.to_string(), 0),
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// Keep ids file-name safe: anything outside `[A-Za-z0-9_-]` becomes `-`.
fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(bytes).map_err(|e| io_err(path, e))?;
    file.sync_all().map_err(|e| io_err(path, e))?;
    Ok(())
}

fn claim_name(dir: &Path, stem: &str, tmp: &Path) -> Result<PathBuf, PersistenceError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}_{attempt}.json")
        };
        let candidate = dir.join(name);
        match fs::hard_link(tmp, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(io_err(&candidate, err)),
        }
    }
    Err(PersistenceError::Exhausted {
        stem: stem.to_string(),
    })
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), PersistenceError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| io_err(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), PersistenceError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn file_name_follows_kind_id_timestamp() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        let handle = store
            .record(ReportKind::Validation, "security", &json!({"passed": true}))
            .unwrap();

        let name = handle.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("validation_security_"), "got {name}");
        assert!(name.ends_with(".json"));
        assert_eq!(handle.path.parent().unwrap(), tmp.path().join("validations"));
        // validation_security_YYYYMMDD_HHMMSS.json
        assert_eq!(name.len(), "validation_security_".len() + 15 + ".json".len());
    }

    #[test]
    fn same_second_writes_get_tie_break_suffix() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        let handles: Vec<_> = (0..5)
            .map(|n| store.record(ReportKind::Agent, "contract_generator", &json!({ "n": n })).unwrap())
            .collect();

        let mut paths: Vec<_> = handles.iter().map(|h| h.path.clone()).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 5, "every write must be retained");
        assert_eq!(store.list(ReportKind::Agent).unwrap().len(), 5);
    }

    #[test]
    fn list_keeps_tie_breaks_in_write_order() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        let dir = store.kind_dir(ReportKind::Agent);
        fs::create_dir_all(&dir).unwrap();
        let stem = "agent_slow_20261019_101500";
        let mut names = vec![format!("{stem}.json")];
        names.extend((1..=11).map(|n| format!("{stem}_{n}.json")));
        names.push("agent_slow_20261019_101501.json".to_string());
        for name in names.iter().rev() {
            fs::write(dir.join(name), "{}").unwrap();
        }

        let listed: Vec<String> = store
            .list(ReportKind::Agent)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn tmp_files_are_removed() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        store.record(ReportKind::Phase, "monitoring", &json!({})).unwrap();

        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("phases"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "tmp file should be removed after link");
    }

    #[test]
    fn digest_matches_bytes_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        let handle = store
            .record(ReportKind::Agent, "x", &json!({"payload": [1, 2, 3]}))
            .unwrap();
        let bytes = store.read_bytes(&handle).unwrap();
        assert_eq!(digest(&bytes), handle.sha256);
    }

    #[test]
    fn ids_are_sanitized() {
        assert_eq!(sanitize_id("code_quality"), "code_quality");
        assert_eq!(sanitize_id("../etc/passwd"), "---etc-passwd");
        assert_eq!(sanitize_id(""), "unnamed");
    }

    #[test]
    fn unwritable_root_is_reported() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("reports");
        fs::write(&blocker, b"not a directory").unwrap();
        let store = ReportStore::new(&blocker);

        let err = store
            .record(ReportKind::Agent, "x", &json!({}))
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }), "got {err}");
    }

    #[test]
    fn list_of_empty_kind_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path());
        assert!(store.list(ReportKind::Phase).unwrap().is_empty());
    }
}
