//! Checks that only read files under the project root.
//!
//! The file inspection itself is synchronous and runs on the blocking pool.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipewright_core::{layout, Gate};
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::check::{check_entry, CheckOutcome, GateCheck};
use crate::error::{io_err, CheckError};

/// Files a project must have, in reporting order.
pub const ESSENTIAL_PATHS: &[&str] = &["contracts", "hardhat.config.js", ".env"];

async fn blocking<F>(root: &Path, f: F) -> Result<CheckOutcome, CheckError>
where
    F: FnOnce(&Path) -> Result<CheckOutcome, CheckError> + Send + 'static,
{
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || f(&root)).await?
}

fn read_optional(path: &Path) -> Result<Option<String>, CheckError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementsCheck;

impl RequirementsCheck {
    pub fn inspect(root: &Path) -> Result<CheckOutcome, CheckError> {
        let missing: Vec<&str> = ESSENTIAL_PATHS
            .iter()
            .copied()
            .filter(|p| !root.join(p).exists())
            .collect();

        let checks: Vec<Value> = [
            ("contracts directory", root.join("contracts").is_dir()),
            ("hardhat.config.js", root.join("hardhat.config.js").exists()),
            (".env file", root.join(".env").exists()),
            ("package.json", root.join("package.json").exists()),
        ]
        .into_iter()
        .map(|(name, passed)| check_entry(name, passed))
        .collect();

        let diagnostics = if missing.is_empty() {
            vec!["all essential files present".to_string()]
        } else {
            missing
                .iter()
                .map(|p| format!("missing essential file: {p}"))
                .collect()
        };

        Ok(CheckOutcome {
            passed: missing.is_empty(),
            diagnostics,
            ..Default::default()
        }
        .detail("missing_files", json!(missing))
        .detail("checks", Value::Array(checks)))
    }
}

#[async_trait]
impl GateCheck for RequirementsCheck {
    fn gate(&self) -> Gate {
        Gate::Requirements
    }

    async fn check(&self, root: &Path) -> Result<CheckOutcome, CheckError> {
        blocking(root, Self::inspect).await
    }
}

// ---------------------------------------------------------------------------
// Security
// ---------------------------------------------------------------------------

/// Looks for live secrets committed to `.env`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityCheck;

/// The well-known development mnemonic; its presence marks a throwaway `.env`.
const DEV_MNEMONIC_MARKER: &str = "test test";

impl SecurityCheck {
    pub fn inspect(root: &Path) -> Result<CheckOutcome, CheckError> {
        let env = read_optional(&root.join(".env"))?.unwrap_or_default();
        let dev_only = env.contains(DEV_MNEMONIC_MARKER);

        let mut issues = Vec::new();
        if env.contains("PRIVATE_KEY=0x") && !dev_only {
            issues.push("live private key in .env; load it from the environment instead".to_string());
        }
        if env.contains("MNEMONIC=") && !dev_only {
            issues.push("live seed phrase in .env".to_string());
        }

        let gitignored = read_optional(&root.join(".gitignore"))?
            .map(|contents| contents.contains(".env"))
            .unwrap_or(false);

        let passed = issues.is_empty();
        let mut diagnostics = issues.clone();
        if passed {
            diagnostics.push("no secrets found in .env".to_string());
        }
        if !gitignored {
            diagnostics.push("advisory: .env is not listed in .gitignore".to_string());
        }

        Ok(CheckOutcome {
            passed,
            diagnostics,
            ..Default::default()
        }
        .detail("security_issues", json!(issues))
        .detail(
            "checks",
            json!([
                check_entry("no private keys in .env", passed),
                check_entry(".env in .gitignore", gitignored),
            ]),
        ))
    }
}

#[async_trait]
impl GateCheck for SecurityCheck {
    fn gate(&self) -> Gate {
        Gate::Security
    }

    async fn check(&self, root: &Path) -> Result<CheckOutcome, CheckError> {
        blocking(root, Self::inspect).await
    }
}

// ---------------------------------------------------------------------------
// Code quality
// ---------------------------------------------------------------------------

/// Every Solidity source under `contracts/` needs a license and NatSpec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodeQualityCheck;

impl CodeQualityCheck {
    pub fn inspect(root: &Path) -> Result<CheckOutcome, CheckError> {
        let files = solidity_files(&layout::contracts_dir(root))?;

        let mut issues = Vec::new();
        for file in &files {
            let contents = fs::read_to_string(file).map_err(|e| io_err(file, e))?;
            let name = file
                .strip_prefix(root)
                .unwrap_or(file)
                .display()
                .to_string();
            if !contents.contains("SPDX-License-Identifier") {
                issues.push(format!("{name}: missing SPDX license identifier"));
            }
            if !contents.contains("@dev") && !contents.contains("@title") {
                issues.push(format!("{name}: missing NatSpec documentation"));
            }
        }

        let passed = issues.is_empty();
        let mut diagnostics = issues.clone();
        if passed {
            diagnostics.push(format!("{} Solidity file(s) checked", files.len()));
        }
        Ok(CheckOutcome {
            passed,
            diagnostics,
            ..Default::default()
        }
        .detail("issues", json!(issues))
        .detail("file_count", json!(files.len())))
    }
}

#[async_trait]
impl GateCheck for CodeQualityCheck {
    fn gate(&self) -> Gate {
        Gate::CodeQuality
    }

    async fn check(&self, root: &Path) -> Result<CheckOutcome, CheckError> {
        blocking(root, Self::inspect).await
    }
}

/// `*.sol` files under `dir`, sorted. A missing `dir` yields none.
fn solidity_files(dir: &Path) -> Result<Vec<PathBuf>, CheckError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(dir).to_path_buf();
            io_err(path, err.into())
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "sol") {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn solidity_files_walks_nested_dirs() {
        let tmp = TempDir::new().unwrap();
        let contracts = tmp.path().join("contracts");
        fs::create_dir_all(contracts.join("generated/deep")).unwrap();
        fs::write(contracts.join("A.sol"), "").unwrap();
        fs::write(contracts.join("generated/deep/B.sol"), "").unwrap();
        fs::write(contracts.join("notes.md"), "").unwrap();
        fs::create_dir_all(contracts.join("legacy.sol")).unwrap();

        let files = solidity_files(&contracts).unwrap();
        assert_eq!(
            files,
            vec![contracts.join("A.sol"), contracts.join("generated/deep/B.sol")]
        );
    }

    #[test]
    fn missing_contracts_dir_means_no_files() {
        let tmp = TempDir::new().unwrap();
        assert!(solidity_files(&tmp.path().join("contracts")).unwrap().is_empty());
    }

    #[test]
    fn requirements_reports_checks_including_package_json() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("package.json"), "{}").unwrap();
        let outcome = RequirementsCheck::inspect(tmp.path()).unwrap();
        assert!(!outcome.passed);
        let checks = outcome.details["checks"].as_array().unwrap();
        assert_eq!(checks.len(), 4);
        assert_eq!(checks[3]["check"], "package.json");
        assert_eq!(checks[3]["passed"], true);
    }
}
