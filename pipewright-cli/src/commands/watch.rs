//! `--mode watch`: print the status, then react to file changes until ctrl-c.

use anyhow::{Context, Result};
use pipewright_daemon::{run_watch, Orchestrator};

pub async fn run(orchestrator: Orchestrator) -> Result<()> {
    super::status::print_table(&orchestrator.snapshot().await);
    println!("Watching {} (ctrl-c to stop)", orchestrator.root().display());
    run_watch(orchestrator)
        .await
        .context("watch mode failed")
}
