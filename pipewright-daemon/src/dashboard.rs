//! Periodic status reporting for watch mode.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::error::DaemonError;
use crate::orchestrator::{Orchestrator, PipelineSnapshot};

/// Log a snapshot every `every` until shutdown. The immediate first tick is
/// skipped; the CLI already printed the status on startup.
pub async fn status_loop(
    orchestrator: Orchestrator,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let snapshot = orchestrator.snapshot().await;
                report(&snapshot);
            }
        }
    }
    Ok(())
}

fn report(snapshot: &PipelineSnapshot) {
    let (passed, failed) = gate_counts(snapshot);
    tracing::info!(
        pipeline = %snapshot.pipeline,
        phase = ?snapshot.status.current_phase,
        running = snapshot.status.is_running,
        agents = %agent_summary(snapshot),
        gates_passed = passed,
        gates_failed = failed,
        "pipeline status"
    );
}

/// `name=status` pairs, comma separated.
pub fn agent_summary(snapshot: &PipelineSnapshot) -> String {
    snapshot
        .agents
        .iter()
        .map(|a| format!("{}={}", a.name, a.status))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn gate_counts(snapshot: &PipelineSnapshot) -> (usize, usize) {
    let passed = snapshot.gates.values().filter(|p| **p).count();
    (passed, snapshot.gates.len() - passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::{Gate, PipelineConfig};
    use tempfile::TempDir;

    #[tokio::test]
    async fn summary_reflects_agents_and_verdicts() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(dir.path(), PipelineConfig::default());
        orchestrator.run_gate(Gate::Performance).await.unwrap();
        orchestrator.run_gate(Gate::Requirements).await.unwrap();

        let snapshot = orchestrator.snapshot().await;
        assert_eq!(gate_counts(&snapshot), (1, 1));
        assert!(agent_summary(&snapshot).contains("contract_generator=idle"));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(dir.path(), PipelineConfig::default());
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(status_loop(orchestrator, Duration::from_secs(60), rx));

        tokio::time::sleep(Duration::from_secs(130)).await;
        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
