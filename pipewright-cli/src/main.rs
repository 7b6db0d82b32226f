//! Pipewright: smart-contract pipeline orchestrator.
//!
//! # Usage
//!
//! ```text
//! pipewright [--project <path>] [--mode watch|validate|run] [--verbose] [--json]
//! pipewright --mode run --phase conception|development|validation|deployment|monitoring
//! pipewright --mode run --agent <name> --task <task> [--args <json>]
//! pipewright --mode run --gate <gate>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use commands::run::RunTarget;
use pipewright_daemon::{logging, Orchestrator};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pipewright",
    version,
    about = "Run smart-contract pipeline phases, agents and validation gates",
    long_about = None,
)]
struct Cli {
    /// Project root.
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Mode::Watch)]
    mode: Mode,

    /// Phase to run (run mode).
    #[arg(long)]
    phase: Option<String>,

    /// Agent to dispatch (run mode); requires --task.
    #[arg(long)]
    agent: Option<String>,

    #[arg(long)]
    task: Option<String>,

    /// Task arguments as a JSON object.
    #[arg(long, value_name = "JSON")]
    args: Option<String>,

    /// Gate to run (run mode).
    #[arg(long)]
    gate: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    /// Print full results as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// React to file changes until interrupted.
    Watch,
    /// Run the requirements, architecture, security and code quality gates.
    Validate,
    /// Run one phase, agent task or gate; print the status otherwise.
    Run,
}

impl Cli {
    fn target(&self) -> Result<RunTarget> {
        if let Some(phase) = &self.phase {
            return Ok(RunTarget::Phase(phase.parse()?));
        }
        if let Some(agent) = &self.agent {
            let task = self
                .task
                .clone()
                .with_context(|| format!("--agent {agent} requires --task"))?;
            let args = match &self.args {
                Some(raw) => serde_json::from_str(raw).context("--args is not valid JSON")?,
                None => serde_json::Value::Object(Default::default()),
            };
            return Ok(RunTarget::Agent {
                agent: agent.clone(),
                task,
                args,
            });
        }
        if let Some(gate) = &self.gate {
            return Ok(RunTarget::Gate(gate.clone()));
        }
        Ok(RunTarget::Status)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.project.is_dir() {
        bail!("project path {} does not exist", cli.project.display());
    }
    let root = std::fs::canonicalize(&cli.project)
        .with_context(|| format!("failed to resolve {}", cli.project.display()))?;
    logging::init_tracing(Some(&root), cli.verbose);

    let target = match cli.mode {
        Mode::Run => Some(cli.target()?),
        _ => None,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let orchestrator = Orchestrator::open(&root)
            .with_context(|| format!("failed to open project at {}", root.display()))?;
        match (cli.mode, target) {
            (Mode::Watch, _) => commands::watch::run(orchestrator).await,
            (Mode::Validate, _) => commands::validate::run(&orchestrator, cli.json).await,
            (Mode::Run, Some(target)) => commands::run::run(&orchestrator, target, cli.json).await,
            (Mode::Run, None) => commands::status::run(&orchestrator, cli.json).await,
        }
    })
}
