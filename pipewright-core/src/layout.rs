//! Working-directory layout under a project root.
//!
//! ```text
//! <project>/
//!   config/pipeline_config.json
//!   logs/pipeline.log
//!   artifacts/
//!   cache/
//!   reports/{agents,validations,phases}/
//!   contracts/generated/
//!   .validation-gates/
//! ```

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};

/// Directories created (idempotently) at startup, relative to the project root.
pub const WORK_DIRS: &[&str] = &[
    "logs",
    "artifacts",
    "cache",
    "reports",
    "contracts/generated",
    ".validation-gates",
];

pub const PIPELINE_LOG: &str = "pipeline.log";

pub fn logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}

pub fn pipeline_log_path(root: &Path) -> PathBuf {
    logs_dir(root).join(PIPELINE_LOG)
}

pub fn reports_dir(root: &Path) -> PathBuf {
    root.join("reports")
}

pub fn contracts_dir(root: &Path) -> PathBuf {
    root.join("contracts")
}

pub fn generated_contracts_dir(root: &Path) -> PathBuf {
    contracts_dir(root).join("generated")
}

/// Create every [`WORK_DIRS`] entry under `root`. Safe to call repeatedly.
pub fn ensure_layout(root: &Path) -> Result<(), ConfigError> {
    for dir in WORK_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            std::fs::create_dir_all(&path).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_layout_is_idempotent() {
        let root = TempDir::new().expect("tempdir");
        ensure_layout(root.path()).expect("first");
        ensure_layout(root.path()).expect("second");
        for dir in WORK_DIRS {
            assert!(root.path().join(dir).is_dir(), "{dir} should exist");
        }
        assert!(contracts_dir(root.path()).is_dir());
    }
}
