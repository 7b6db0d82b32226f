//! Phase state machine tests: busy rejection, phase compositions, required
//! flags, step errors, and phase persistence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use pipewright_agents::{
    AgentRegistry, Capability, CapabilityError, Dispatcher, TaskContext, TaskOutput,
};
use pipewright_core::{Gate, Phase, PhaseResult, PipelineConfig, PipelineStatus};
use pipewright_daemon::{Orchestrator, PipelineError};
use pipewright_gates::{engine::default_checks, ArchitectureCheck, CommandSpec, GateEngine};
use pipewright_store::{ReportKind, ReportStore};
use serde_json::{json, Value};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Held(Arc<Notify>);

#[async_trait]
impl Capability for Held {
    async fn run(&self, _: &str, _: &Value, _: &TaskContext) -> Result<TaskOutput, CapabilityError> {
        self.0.notified().await;
        Ok(TaskOutput::ok(json!({ "held": true })))
    }
}

fn quiet_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    for settings in config.agents.values_mut() {
        settings.settings.insert("auto_save".into(), json!(false));
    }
    config
}

/// Orchestrator whose Architecture gate runs a compiler that does not exist.
fn orchestrator_with(root: &Path, config: PipelineConfig, registry: AgentRegistry) -> Orchestrator {
    let store = ReportStore::new(root.join("reports"));
    let dispatcher = Dispatcher::new(
        registry,
        config.pipeline.max_concurrent_agents,
        store.clone(),
        root,
    );
    let mut checks = default_checks();
    checks.push(Arc::new(ArchitectureCheck::new(CommandSpec::new(
        "pipewright-no-such-compiler",
        &["compile"],
    ))));
    let gates = GateEngine::new(root, store.clone(), Duration::from_secs(5), checks);
    Orchestrator::with_components(root, config, store, dispatcher, gates)
}

fn orchestrator(root: &Path, config: PipelineConfig) -> Orchestrator {
    let registry = AgentRegistry::from_config(&config, root);
    orchestrator_with(root, config, registry)
}

// ---------------------------------------------------------------------------
// 1. Busy rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_phase_is_rejected_while_one_runs() {
    let root = TempDir::new().unwrap();
    let config = quiet_config();
    let release = Arc::new(Notify::new());
    let mut registry = AgentRegistry::from_config(&config, root.path());
    registry.install("contract_generator", Arc::new(Held(Arc::clone(&release))));
    let orchestrator = orchestrator_with(root.path(), config, registry);

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run_phase(Phase::Conception).await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while !orchestrator.status().is_running {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("phase never started");

    let err = orchestrator.run_phase(Phase::Validation).await.unwrap_err();
    assert!(matches!(err, PipelineError::PipelineBusy { current: Phase::Conception }));
    assert_eq!(
        orchestrator.status(),
        PipelineStatus { current_phase: Some(Phase::Conception), is_running: true }
    );

    release.notify_one();
    let result = running.await.unwrap().expect("conception");
    assert!(result.success);
    assert_eq!(orchestrator.status(), PipelineStatus::default());

    // Only the phase that ran was recorded.
    let phases = orchestrator.store().list(ReportKind::Phase).unwrap();
    assert_eq!(phases.len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Compositions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn monitoring_succeeds_with_no_steps() {
    let root = TempDir::new().unwrap();
    let orchestrator = orchestrator(root.path(), quiet_config());

    let result = orchestrator.run_phase(Phase::Monitoring).await.unwrap();
    assert!(result.success);
    assert!(result.agents.is_empty() && result.gates.is_empty());
    assert!(result.error.is_none());
    assert!(result.finished_at >= result.started_at);
}

#[tokio::test]
async fn development_fails_when_a_required_gate_fails() {
    let root = TempDir::new().unwrap();
    root.child("contracts").create_dir_all().unwrap();
    let orchestrator = orchestrator(root.path(), quiet_config());

    let result = orchestrator.run_phase(Phase::Development).await.unwrap();
    assert!(!result.success);
    assert!(result.error.is_none(), "gate failures are not step errors");
    let gates: Vec<Gate> = result.gates.iter().map(|g| g.gate).collect();
    assert_eq!(gates, vec![Gate::Requirements, Gate::Architecture]);
    assert_eq!(result.gates[0].missing_files(), vec!["hardhat.config.js", ".env"]);

    let verdicts = orchestrator.snapshot().await.gates;
    assert_eq!(verdicts.get(&Gate::Requirements), Some(&false));
    assert_eq!(verdicts.get(&Gate::Architecture), Some(&false));
}

#[tokio::test]
async fn optional_gate_failures_do_not_fail_the_phase() {
    let root = TempDir::new().unwrap();
    let mut config = quiet_config();
    for gate in &mut config.validation.gates {
        gate.required = false;
    }
    let orchestrator = orchestrator(root.path(), config);

    let result = orchestrator.run_phase(Phase::Development).await.unwrap();
    assert!(result.gates.iter().all(|g| !g.passed));
    assert!(result.success);
}

#[tokio::test]
async fn validation_runs_security_then_code_quality() {
    let root = TempDir::new().unwrap();
    root.child("contracts/Vault.sol")
        .write_str("// SPDX-License-Identifier: MIT\n/// @title Vault\ncontract Vault {}\n")
        .unwrap();
    let orchestrator = orchestrator(root.path(), quiet_config());

    let result = orchestrator.run_phase(Phase::Validation).await.unwrap();
    let gates: Vec<Gate> = result.gates.iter().map(|g| g.gate).collect();
    assert_eq!(gates, vec![Gate::Security, Gate::CodeQuality]);
    assert!(result.success);
}

#[tokio::test]
async fn conception_generates_an_erc721_scaffold() {
    let root = TempDir::new().unwrap();
    let orchestrator = orchestrator(root.path(), quiet_config());

    let result = orchestrator.run_phase(Phase::Conception).await.unwrap();
    assert_eq!(result.agents.len(), 1);
    let agent = &result.agents[0];
    assert_eq!(agent.agent.as_str(), "contract_generator");
    assert_eq!(agent.payload["contract_type"], "erc721");
    assert!(agent.payload["code"].as_str().unwrap().contains("pragma solidity"));
}

#[tokio::test]
async fn unimplemented_deployment_fails_only_when_required() {
    let root = TempDir::new().unwrap();
    let orch = orchestrator(root.path(), quiet_config());
    let result = orch.run_phase(Phase::Deployment).await.unwrap();
    assert!(!result.success);
    assert!(!result.agents[0].success);
    assert!(result.error.is_none());

    let root = TempDir::new().unwrap();
    let mut config = quiet_config();
    config.agents.get_mut("deployment_manager").unwrap().required = false;
    let orchestrator = orchestrator(root.path(), config);
    let result = orchestrator.run_phase(Phase::Deployment).await.unwrap();
    assert!(!result.agents[0].success);
    assert!(result.success);
}

// ---------------------------------------------------------------------------
// 3. Step errors and persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn disabled_agent_is_a_step_error() {
    let root = TempDir::new().unwrap();
    let mut config = quiet_config();
    config.agents.get_mut("contract_generator").unwrap().enabled = false;
    let orchestrator = orchestrator(root.path(), config);

    let result = orchestrator.run_phase(Phase::Conception).await.unwrap();
    assert!(!result.success);
    assert!(result.agents.is_empty());
    let error = result.error.expect("step error recorded");
    assert!(error.contains("contract_generator"), "{error}");
    assert_eq!(orchestrator.status(), PipelineStatus::default());
}

#[tokio::test]
async fn phase_report_matches_returned_result() {
    let root = TempDir::new().unwrap();
    let orchestrator = orchestrator(root.path(), quiet_config());

    let result = orchestrator.run_phase(Phase::Validation).await.unwrap();
    let paths = orchestrator.store().list(ReportKind::Phase).unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("phase_validation_"));
    let stored: PhaseResult = orchestrator.store().load_path(&paths[0]).unwrap();
    assert_eq!(stored, result);

    // Each gate of the phase also wrote its own validation report.
    assert_eq!(orchestrator.store().list(ReportKind::Validation).unwrap().len(), 2);
}

#[tokio::test]
async fn unwritable_report_store_surfaces_phase_result() {
    let root = TempDir::new().unwrap();
    root.child("reports").write_str("not a directory").unwrap();
    let orchestrator = orchestrator(root.path(), quiet_config());

    match orchestrator.run_phase(Phase::Monitoring).await {
        Err(PipelineError::Persistence { result, .. }) => {
            assert_eq!(result.phase, Phase::Monitoring);
            assert!(result.success);
        }
        other => panic!("expected persistence error, got {other:?}"),
    }
    assert!(!orchestrator.status().is_running);
}

#[tokio::test]
async fn open_prepares_layout_and_default_config() {
    let root = TempDir::new().unwrap();
    let orchestrator = Orchestrator::open(root.path()).unwrap();

    root.child("config/pipeline_config.json").assert(predicates::path::exists());
    root.child("contracts/generated").assert(predicates::path::is_dir());
    assert_eq!(orchestrator.config().pipeline.max_concurrent_agents, 3);
    assert_eq!(orchestrator.snapshot().await.agents.len(), 4);
}
