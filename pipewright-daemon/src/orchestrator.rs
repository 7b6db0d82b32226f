//! Orchestrator: owns the pipeline's shared state and runs phases.
//!
//! Phase state (`current_phase`, `is_running`) changes only in
//! [`Orchestrator::run_phase`]: one check-and-set under a lock to begin, one
//! reset when the phase's guard drops. A second `run_phase` while one is
//! active is rejected with [`PipelineError::PipelineBusy`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use pipewright_agents::{AgentRegistry, AgentSnapshot, DispatchError, Dispatcher};
use pipewright_core::{
    config, layout, AgentResult, Gate, GateResult, Phase, PhaseResult, PipelineConfig,
    PipelineStatus, WatchEvent,
};
use pipewright_gates::{GateEngine, GateError};
use pipewright_store::{PersistenceError, ReportKind, ReportStore};
use serde::Serialize;
use serde_json::Value;

use crate::error::{DaemonError, PipelineError};
use crate::phase::{self, Step};
use crate::watch::{ReactionHandler, Route};

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub pipeline: String,
    pub project_root: PathBuf,
    pub status: PipelineStatus,
    pub agents: Vec<AgentSnapshot>,
    /// Last verdict per gate; gates never run are absent.
    pub gates: BTreeMap<Gate, bool>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    config: PipelineConfig,
    store: ReportStore,
    dispatcher: Dispatcher,
    gates: GateEngine,
    phase: Mutex<PipelineStatus>,
}

/// Resets the phase state when a phase ends, however it ends.
struct ActivePhase<'a> {
    state: &'a Mutex<PipelineStatus>,
}

impl Drop for ActivePhase<'_> {
    fn drop(&mut self) {
        *lock(self.state) = PipelineStatus::default();
    }
}

fn lock(state: &Mutex<PipelineStatus>) -> MutexGuard<'_, PipelineStatus> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Orchestrator {
    /// Prepare `root`: working directories, configuration (synthesized when
    /// missing), and the built-in agents and gates.
    pub fn open(root: &Path) -> Result<Self, DaemonError> {
        layout::ensure_layout(root)?;
        let (config, created) = config::load_or_init_at(root)?;
        if created {
            tracing::info!(
                path = %config::config_path_at(root).display(),
                "wrote default configuration"
            );
        }
        Ok(Self::new(root, config))
    }

    /// Orchestrator with the built-in registry and gate checks.
    pub fn new(root: &Path, config: PipelineConfig) -> Self {
        let store = ReportStore::new(layout::reports_dir(root));
        let registry = AgentRegistry::from_config(&config, root);
        let dispatcher = Dispatcher::new(
            registry,
            config.pipeline.max_concurrent_agents,
            store.clone(),
            root,
        );
        let gates = GateEngine::standard(root, store.clone(), config.gate_timeout());
        Self::with_components(root, config, store, dispatcher, gates)
    }

    pub fn with_components(
        root: &Path,
        config: PipelineConfig,
        store: ReportStore,
        dispatcher: Dispatcher,
        gates: GateEngine,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.to_path_buf(),
                config,
                store,
                dispatcher,
                gates,
                phase: Mutex::new(PipelineStatus::default()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &ReportStore {
        &self.inner.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn gates(&self) -> &GateEngine {
        &self.inner.gates
    }

    pub fn status(&self) -> PipelineStatus {
        *lock(&self.inner.phase)
    }

    pub async fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            pipeline: self.inner.config.pipeline.name.clone(),
            project_root: self.inner.root.clone(),
            status: self.status(),
            agents: self.inner.dispatcher.snapshot().await,
            gates: self.inner.gates.verdicts().await,
        }
    }

    pub async fn dispatch(
        &self,
        agent: &str,
        task: &str,
        args: Value,
    ) -> Result<AgentResult, DispatchError> {
        self.inner.dispatcher.dispatch(agent, task, args).await
    }

    pub async fn run_gate(&self, gate: Gate) -> Result<GateResult, GateError> {
        self.inner.gates.run_gate(gate).await
    }

    pub async fn run_named_gate(&self, name: &str) -> Result<GateResult, GateError> {
        self.inner.gates.run_named(name).await
    }

    pub async fn validate_all(&self) -> Vec<Result<GateResult, GateError>> {
        self.inner.gates.validate_all().await
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    /// Run every step of `phase` and persist the resulting [`PhaseResult`].
    ///
    /// Phases are not required to run in their natural order.
    pub async fn run_phase(&self, phase: Phase) -> Result<PhaseResult, PipelineError> {
        let _active = self.begin_phase(phase)?;
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(phase = %phase, "phase started");

        let mut agents = Vec::new();
        let mut gates = Vec::new();
        let mut required_ok = true;
        let mut error = None;

        for step in phase::steps(phase) {
            match step {
                Step::Dispatch { agent, task, args } => {
                    match self.inner.dispatcher.dispatch(agent, task, args).await {
                        Ok(result) => {
                            required_ok &= result.success || !self.inner.config.agent_required(agent);
                            agents.push(result);
                        }
                        Err(DispatchError::Persistence { result, source }) => {
                            agents.push(*result);
                            error = Some(source.to_string());
                            break;
                        }
                        Err(err) => {
                            error = Some(err.to_string());
                            break;
                        }
                    }
                }
                Step::Gate(gate) => match self.inner.gates.run_gate(gate).await {
                    Ok(result) => {
                        required_ok &= result.passed || !self.inner.config.gate_required(gate);
                        gates.push(result);
                    }
                    Err(GateError::Persistence { result, source }) => {
                        gates.push(*result);
                        error = Some(source.to_string());
                        break;
                    }
                    Err(err) => {
                        error = Some(err.to_string());
                        break;
                    }
                },
            }
        }

        if phase == Phase::Monitoring {
            tracing::info!("monitoring active");
        }
        if let Some(err) = &error {
            tracing::error!(phase = %phase, error = %err, "phase step failed");
        }

        let result = PhaseResult {
            phase,
            started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            agents,
            gates,
            success: required_ok && error.is_none(),
            error,
        };
        tracing::info!(
            phase = %phase,
            success = result.success,
            duration_ms = result.duration_ms,
            "phase completed"
        );

        match self.persist_phase(&result).await {
            Ok(()) => Ok(result),
            Err(source) => Err(PipelineError::Persistence {
                result: Box::new(result),
                source,
            }),
        }
    }

    fn begin_phase(&self, phase: Phase) -> Result<ActivePhase<'_>, PipelineError> {
        let mut state = lock(&self.inner.phase);
        if state.is_running {
            let current = state.current_phase.unwrap_or(phase);
            tracing::warn!(requested = %phase, current = %current, "phase rejected: pipeline busy");
            return Err(PipelineError::PipelineBusy { current });
        }
        *state = PipelineStatus {
            current_phase: Some(phase),
            is_running: true,
        };
        Ok(ActivePhase {
            state: &self.inner.phase,
        })
    }

    async fn persist_phase(&self, result: &PhaseResult) -> Result<(), PersistenceError> {
        let store = self.inner.store.clone();
        let stored = result.clone();
        tokio::task::spawn_blocking(move || {
            store
                .record(ReportKind::Phase, stored.phase.as_str(), &stored)
                .map(|_| ())
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

#[async_trait]
impl ReactionHandler for Orchestrator {
    async fn react(&self, route: Route, event: WatchEvent) {
        let name = event
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match route {
            Route::ValidateSecurity => {
                tracing::info!(file = %name, "contract changed; running security gate");
                match self.run_gate(Gate::Security).await {
                    Ok(result) if result.passed => tracing::info!(file = %name, "security gate passed"),
                    Ok(result) => tracing::warn!(
                        file = %name,
                        diagnostics = ?result.diagnostics,
                        "security issues detected"
                    ),
                    Err(err) => tracing::error!(file = %name, error = %err, "security gate failed to run"),
                }
            }
            Route::SuggestRevalidation => {
                tracing::info!(file = %name, "tests changed; revalidation suggested");
            }
            Route::Ignore => {}
        }
    }
}
