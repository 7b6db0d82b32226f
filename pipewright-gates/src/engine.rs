//! Gate engine: runs checks under a deadline, persists, and tracks the last
//! verdict per gate.
//!
//! ## `run_gate` protocol
//!
//! 1. Resolve the check (`UnknownGate` when none is registered).
//! 2. Take the gate's run lock so runs of one gate complete in call order.
//! 3. Run the check on its own task under the engine timeout. A timeout aborts
//!    the task (killing any child process) and yields `passed=false` with
//!    `timeout after Ns`. Check errors and panics also yield `passed=false`.
//! 4. Persist the result, then overwrite the gate's entry in the verdict map.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pipewright_core::{Gate, GateResult};
use pipewright_store::{PersistenceError, ReportKind, ReportStore};
use tokio::sync::{Mutex, RwLock};

use crate::check::GateCheck;
use crate::error::GateError;
use crate::external::ArchitectureCheck;
use crate::local::{CodeQualityCheck, RequirementsCheck, SecurityCheck};
use crate::placeholder::PlaceholderCheck;

/// Gates run by [`GateEngine::validate_all`], in order.
pub const VALIDATE_ALL: &[Gate] = &[
    Gate::Requirements,
    Gate::Architecture,
    Gate::Security,
    Gate::CodeQuality,
];

/// One check per gate, with the stock compiler command.
pub fn default_checks() -> Vec<Arc<dyn GateCheck>> {
    vec![
        Arc::new(RequirementsCheck),
        Arc::new(ArchitectureCheck::default()),
        Arc::new(SecurityCheck),
        Arc::new(CodeQualityCheck),
        Arc::new(PlaceholderCheck(Gate::Performance)),
        Arc::new(PlaceholderCheck(Gate::Compliance)),
    ]
}

#[derive(Clone)]
pub struct GateEngine {
    inner: Arc<Inner>,
}

struct Inner {
    checks: HashMap<Gate, Arc<dyn GateCheck>>,
    run_locks: HashMap<Gate, Mutex<()>>,
    verdicts: RwLock<BTreeMap<Gate, bool>>,
    store: ReportStore,
    project_root: PathBuf,
    timeout: Duration,
}

impl GateEngine {
    /// Engine over `checks`; a later check for the same gate replaces an earlier one.
    pub fn new(
        project_root: impl Into<PathBuf>,
        store: ReportStore,
        timeout: Duration,
        checks: Vec<Arc<dyn GateCheck>>,
    ) -> Self {
        let checks: HashMap<Gate, Arc<dyn GateCheck>> =
            checks.into_iter().map(|c| (c.gate(), c)).collect();
        let run_locks = checks.keys().map(|g| (*g, Mutex::new(()))).collect();
        Self {
            inner: Arc::new(Inner {
                checks,
                run_locks,
                verdicts: RwLock::new(BTreeMap::new()),
                store,
                project_root: project_root.into(),
                timeout,
            }),
        }
    }

    /// Engine with [`default_checks`].
    pub fn standard(project_root: impl Into<PathBuf>, store: ReportStore, timeout: Duration) -> Self {
        Self::new(project_root, store, timeout, default_checks())
    }

    pub fn project_root(&self) -> &Path {
        &self.inner.project_root
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Parse `name` and run that gate.
    pub async fn run_named(&self, name: &str) -> Result<GateResult, GateError> {
        let gate: Gate = name
            .parse()
            .map_err(|_| GateError::UnknownGate(name.to_string()))?;
        self.run_gate(gate).await
    }

    pub async fn run_gate(&self, gate: Gate) -> Result<GateResult, GateError> {
        let (check, lock) = match (self.inner.checks.get(&gate), self.inner.run_locks.get(&gate)) {
            (Some(check), Some(lock)) => (Arc::clone(check), lock),
            _ => return Err(GateError::UnknownGate(gate.to_string())),
        };
        let _turn = lock.lock().await;

        tracing::info!(gate = %gate, "running gate");
        let result = self.execute(gate, check).await;
        tracing::info!(gate = %gate, passed = result.passed, "gate completed");

        let persisted = self.persist(&result).await;
        self.inner.verdicts.write().await.insert(gate, result.passed);

        match persisted {
            Ok(()) => Ok(result),
            Err(source) => {
                tracing::error!(gate = %gate, error = %source, "failed to persist gate result");
                Err(GateError::Persistence {
                    result: Box::new(result),
                    source,
                })
            }
        }
    }

    /// Requirements, Architecture, Security, CodeQuality, in order.
    pub async fn validate_all(&self) -> Vec<Result<GateResult, GateError>> {
        let mut results = Vec::with_capacity(VALIDATE_ALL.len());
        for gate in VALIDATE_ALL {
            results.push(self.run_gate(*gate).await);
        }
        results
    }

    /// Last pass/fail per gate; gates never run are absent.
    pub async fn verdicts(&self) -> BTreeMap<Gate, bool> {
        self.inner.verdicts.read().await.clone()
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn execute(&self, gate: Gate, check: Arc<dyn GateCheck>) -> GateResult {
        let root = self.inner.project_root.clone();
        let mut handle = tokio::spawn(async move { check.check(&root).await });

        match tokio::time::timeout(self.inner.timeout, &mut handle).await {
            Ok(Ok(Ok(outcome))) => outcome.into_result(gate),
            Ok(Ok(Err(err))) => {
                tracing::warn!(gate = %gate, error = %err, "gate check error");
                let err = GateError::Check {
                    gate,
                    message: err.to_string(),
                };
                GateResult::failed(gate, err.to_string())
            }
            Ok(Err(join)) => {
                let message = if join.is_panic() {
                    "check panicked".to_string()
                } else {
                    join.to_string()
                };
                GateResult::failed(gate, GateError::Check { gate, message }.to_string())
            }
            Err(_) => {
                handle.abort();
                let err = GateError::Timeout {
                    gate,
                    secs: self.inner.timeout.as_secs_f64(),
                };
                tracing::warn!(gate = %gate, "{err}");
                GateResult::failed(gate, err.to_string())
            }
        }
    }

    async fn persist(&self, result: &GateResult) -> Result<(), PersistenceError> {
        let store = self.inner.store.clone();
        let stored = result.clone();
        tokio::task::spawn_blocking(move || {
            store
                .record(ReportKind::Validation, stored.gate.as_str(), &stored)
                .map(|handle| {
                    tracing::debug!(gate = %stored.gate, path = %handle.path.display(), "gate result stored");
                })
        })
        .await
        .unwrap_or_else(|join| {
            Err(PersistenceError::Io {
                path: self.inner.store.root().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, join.to_string()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unregistered_gate_is_unknown() {
        let tmp = TempDir::new().unwrap();
        let engine = GateEngine::new(
            tmp.path(),
            ReportStore::new(tmp.path().join("reports")),
            Duration::from_secs(1),
            vec![Arc::new(RequirementsCheck)],
        );
        let err = engine.run_gate(Gate::Security).await.unwrap_err();
        assert!(matches!(err, GateError::UnknownGate(ref g) if g == "security"));
        assert!(engine.verdicts().await.is_empty());
    }

    #[test]
    fn timeout_message_uses_whole_seconds() {
        let err = GateError::Timeout {
            gate: Gate::Architecture,
            secs: 30.0,
        };
        assert_eq!(err.to_string(), "timeout after 30s");
    }
}
