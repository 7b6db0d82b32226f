//! Checks that shell out to an external toolchain.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use pipewright_core::Gate;
use serde_json::json;
use tokio::process::Command;

use crate::check::{check_entry, CheckOutcome, GateCheck};
use crate::error::CheckError;

/// Marker the compiler prints on a clean build.
pub const SUCCESS_MARKER: &str = "Successfully";

const OUTPUT_TAIL_CHARS: usize = 500;

/// A program plus arguments, run in the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// `npx hardhat compile`
    pub fn hardhat_compile() -> Self {
        Self::new("npx", &["hardhat", "compile"])
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Compiles the project and passes iff the compiler reports success.
///
/// The child is spawned with `kill_on_drop`, so when the engine's deadline
/// drops this future the compiler process is killed with it.
#[derive(Debug, Clone)]
pub struct ArchitectureCheck {
    command: CommandSpec,
}

impl ArchitectureCheck {
    pub fn new(command: CommandSpec) -> Self {
        Self { command }
    }
}

impl Default for ArchitectureCheck {
    fn default() -> Self {
        Self::new(CommandSpec::hardhat_compile())
    }
}

#[async_trait]
impl GateCheck for ArchitectureCheck {
    fn gate(&self) -> Gate {
        Gate::Architecture
    }

    async fn check(&self, root: &Path) -> Result<CheckOutcome, CheckError> {
        tracing::debug!(command = %self.command.display(), root = %root.display(), "running compiler");
        let output = Command::new(&self.command.program)
            .args(&self.command.args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CheckError::Spawn {
                command: self.command.display(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let compiled = stdout.contains(SUCCESS_MARKER);

        let mut diagnostics = vec![if compiled {
            "compilation succeeded".to_string()
        } else {
            match output.status.code() {
                Some(code) => format!("compilation failed (exit code {code})"),
                None => "compilation failed (terminated by signal)".to_string(),
            }
        }];
        if !compiled && !stderr.trim().is_empty() {
            diagnostics.push(tail(stderr.trim(), OUTPUT_TAIL_CHARS));
        }

        Ok(CheckOutcome {
            passed: compiled,
            diagnostics,
            ..Default::default()
        }
        .detail("compilation_success", json!(compiled))
        .detail("output", json!(tail(&stdout, OUTPUT_TAIL_CHARS)))
        .detail(
            "checks",
            json!([
                check_entry("contracts compile", compiled),
                check_entry("solidity 0.8.x", stdout.contains("0.8")),
            ]),
        ))
    }
}

/// Last `max` characters of `text`, on a char boundary.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect()
}
