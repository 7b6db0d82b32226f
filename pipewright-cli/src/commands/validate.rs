//! `--mode validate`: run the four blocking gates in order.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use pipewright_core::GateResult;
use pipewright_daemon::Orchestrator;
use pipewright_gates::GateError;

pub async fn run(orchestrator: &Orchestrator, json: bool) -> Result<()> {
    let results = orchestrator.validate_all().await;

    let mut recorded = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(result) => recorded.push(result),
            Err(GateError::Persistence { result, source }) => {
                errors.push(format!("{}: {source}", result.gate));
                recorded.push(*result);
            }
            Err(err) => errors.push(err.to_string()),
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&recorded).context("failed to serialize gate results")?
        );
    } else {
        for result in &recorded {
            print_gate(result);
        }
        let passed = recorded.iter().filter(|r| r.passed).count();
        println!("{passed}/{} gates passed", recorded.len());
    }

    if !errors.is_empty() {
        bail!("validation incomplete: {}", errors.join("; "));
    }
    Ok(())
}

/// One ✅/❌ line per gate, diagnostics indented below.
pub fn print_gate(result: &GateResult) {
    let title = result.gate.title();
    if result.passed {
        println!("✅ {} {}", title, "passed".green());
    } else {
        println!("❌ {} {}", title, "failed".red());
    }
    for diagnostic in &result.diagnostics {
        println!("   {diagnostic}");
    }
}
