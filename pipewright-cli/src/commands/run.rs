//! `--mode run`: one phase, one agent task, or one gate.

use anyhow::{Context, Result};
use colored::Colorize;
use pipewright_core::{AgentResult, Phase, PhaseResult};
use pipewright_daemon::{Orchestrator, PipelineError};
use pipewright_gates::GateError;
use serde::Serialize;
use serde_json::Value;

use super::validate::print_gate;

#[derive(Debug, Clone, PartialEq)]
pub enum RunTarget {
    Phase(Phase),
    Agent {
        agent: String,
        task: String,
        args: Value,
    },
    Gate(String),
    Status,
}

pub async fn run(orchestrator: &Orchestrator, target: RunTarget, json: bool) -> Result<()> {
    match target {
        RunTarget::Phase(phase) => match orchestrator.run_phase(phase).await {
            Ok(result) => emit(&result, json, print_phase),
            Err(PipelineError::Persistence { result, source }) => {
                emit(&*result, json, print_phase)?;
                Err(source).context("failed to record phase result")
            }
            Err(err) => Err(err.into()),
        },
        RunTarget::Agent { agent, task, args } => {
            let result = orchestrator
                .dispatch(&agent, &task, args)
                .await
                .with_context(|| format!("dispatch of {agent}/{task} failed"))?;
            emit(&result, json, print_agent)
        }
        RunTarget::Gate(name) => match orchestrator.run_named_gate(&name).await {
            Ok(result) => emit(&result, json, print_gate),
            Err(GateError::Persistence { result, source }) => {
                emit(&*result, json, print_gate)?;
                Err(source).context("failed to record gate result")
            }
            Err(err) => Err(err.into()),
        },
        RunTarget::Status => super::status::run(orchestrator, json).await,
    }
}

fn emit<T: Serialize>(value: &T, json: bool, human: fn(&T)) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("failed to serialize result")?
        );
    } else {
        human(value);
    }
    Ok(())
}

fn print_agent(result: &AgentResult) {
    if result.success {
        println!("✅ {} {} {}", result.agent, result.task, "succeeded".green());
    } else {
        println!("❌ {} {} {}", result.agent, result.task, "failed".red());
    }
    if let Some(error) = &result.error {
        println!("   {error}");
    }
    if let Some(path) = result.payload.get("saved_to").and_then(Value::as_str) {
        println!("   saved to {path}");
    }
}

fn print_phase(result: &PhaseResult) {
    let title = result.phase.as_str().to_uppercase();
    if result.success {
        println!("✅ {} phase {} ({} ms)", title, "completed".green(), result.duration_ms);
    } else {
        println!("❌ {} phase {} ({} ms)", title, "failed".red(), result.duration_ms);
    }
    for agent in &result.agents {
        print_agent(agent);
    }
    for gate in &result.gates {
        print_gate(gate);
    }
    if let Some(error) = &result.error {
        println!("   {error}");
    }
}
