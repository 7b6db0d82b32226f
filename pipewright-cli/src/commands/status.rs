//! Pipeline status table.

use anyhow::{Context, Result};
use colored::Colorize;
use pipewright_core::{AgentStatus, Gate};
use pipewright_daemon::{Orchestrator, PipelineSnapshot};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct AgentRow {
    #[tabled(rename = "agent")]
    agent: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "enabled")]
    enabled: String,
    #[tabled(rename = "last run")]
    last_run: String,
}

#[derive(Tabled)]
struct GateRow {
    #[tabled(rename = "gate")]
    gate: String,
    #[tabled(rename = "last verdict")]
    verdict: String,
}

pub async fn run(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let snapshot = orchestrator.snapshot().await;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("failed to serialize status JSON")?
        );
        return Ok(());
    }
    print_table(&snapshot);
    Ok(())
}

pub fn print_table(snapshot: &PipelineSnapshot) {
    let phase = match snapshot.status.current_phase {
        Some(phase) if snapshot.status.is_running => format!("running {phase}"),
        _ => "idle".to_string(),
    };
    println!(
        "Pipewright v{} | {} | {} | {}",
        env!("CARGO_PKG_VERSION"),
        snapshot.pipeline.bold(),
        snapshot.project_root.display(),
        phase,
    );

    let agents: Vec<AgentRow> = snapshot
        .agents
        .iter()
        .map(|agent| AgentRow {
            agent: if agent.implemented {
                agent.display_name.clone()
            } else {
                format!("{} (not implemented)", agent.display_name)
            },
            status: status_label(agent.status),
            enabled: if agent.enabled { "yes" } else { "no" }.to_string(),
            last_run: agent
                .last_run
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
        })
        .collect();
    let mut table = Table::new(agents);
    table.with(Style::rounded());
    println!("{table}");

    let gates: Vec<GateRow> = Gate::all()
        .iter()
        .map(|gate| GateRow {
            gate: gate.title(),
            verdict: match snapshot.gates.get(gate) {
                Some(true) => "✅ passed".to_string(),
                Some(false) => "❌ failed".to_string(),
                None => "not run".dimmed().to_string(),
            },
        })
        .collect();
    let mut table = Table::new(gates);
    table.with(Style::rounded());
    println!("{table}");
}

fn status_label(status: AgentStatus) -> String {
    let label = status.as_str();
    match status {
        AgentStatus::Success => label.green().to_string(),
        AgentStatus::Failed => label.red().to_string(),
        AgentStatus::Running => label.yellow().to_string(),
        AgentStatus::Disabled => label.dimmed().to_string(),
        AgentStatus::Idle => label.to_string(),
    }
}
