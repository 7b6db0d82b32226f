//! Domain types for the pipeline engine.
//!
//! Result records (`GateResult`, `AgentResult`, `PhaseResult`) are immutable
//! once produced: a new run yields a new record, it never edits an old one.
//! All types round-trip through serde_json unchanged.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed agent name; the unique key in the agent registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentName(pub String);

impl AgentName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AgentName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Returned when a phase or gate name does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'; expected one of: {expected}")]
pub struct ParseNameError {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Pipeline phases in their declared natural order.
///
/// The order is advisory: a directly requested phase runs regardless of
/// which phases ran before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Conception,
    Development,
    Validation,
    Deployment,
    Monitoring,
}

impl Phase {
    /// All phases in declared order.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Conception,
            Phase::Development,
            Phase::Validation,
            Phase::Deployment,
            Phase::Monitoring,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Conception => "conception",
            Phase::Development => "development",
            Phase::Validation => "validation",
            Phase::Deployment => "deployment",
            Phase::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Phase::all()
            .iter()
            .find(|p| p.as_str() == wanted)
            .copied()
            .ok_or_else(|| ParseNameError {
                kind: "phase",
                value: s.to_string(),
                expected: join_names(Phase::all().iter().map(Phase::as_str)),
            })
    }
}

/// Named pass/fail validation gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Requirements,
    Architecture,
    Security,
    CodeQuality,
    Performance,
    Compliance,
}

impl Gate {
    /// All gates in declaration order.
    pub fn all() -> &'static [Gate] {
        &[
            Gate::Requirements,
            Gate::Architecture,
            Gate::Security,
            Gate::CodeQuality,
            Gate::Performance,
            Gate::Compliance,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Requirements => "requirements",
            Gate::Architecture => "architecture",
            Gate::Security => "security",
            Gate::CodeQuality => "code_quality",
            Gate::Performance => "performance",
            Gate::Compliance => "compliance",
        }
    }

    /// Human label, e.g. `Code Quality`.
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gate {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Gate::all()
            .iter()
            .find(|g| g.as_str() == wanted)
            .copied()
            .ok_or_else(|| ParseNameError {
                kind: "gate",
                value: s.to_string(),
                expected: join_names(Gate::all().iter().map(Gate::as_str)),
            })
    }
}

/// Run status of a registered agent.
///
/// Transitions (enforced by the dispatcher's single mutation point):
///
/// ```text
/// Idle | Success | Failed  ──dispatch──▶ Running
/// Running ──complete──▶ Success | Failed
/// Disabled: terminal, set from configuration at startup
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
    Disabled,
}

impl AgentStatus {
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Idle | Success | Failed, Running) | (Running, Success | Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Success => "success",
            AgentStatus::Failed => "failed",
            AgentStatus::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    Created,
    Modified,
    Deleted,
}

// ---------------------------------------------------------------------------
// Result records
// ---------------------------------------------------------------------------

/// Outcome of one gate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: Gate,
    pub passed: bool,
    #[serde(default)]
    pub diagnostics: Vec<String>,
    /// Check-specific structured detail (`missing_files`, `checks`, …).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl GateResult {
    pub fn failed(gate: Gate, diagnostic: impl Into<String>) -> Self {
        Self {
            gate,
            passed: false,
            diagnostics: vec![diagnostic.into()],
            details: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// `details.missing_files` as strings; empty when the check did not report any.
    pub fn missing_files(&self) -> Vec<String> {
        self.details
            .get("missing_files")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Outcome of one agent dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentName,
    pub task: String,
    pub success: bool,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentResult {
    pub fn failure(agent: AgentName, task: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            agent,
            task: task.into(),
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one phase run, including every sub-step result it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub agents: Vec<AgentResult>,
    #[serde(default)]
    pub gates: Vec<GateResult>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single filesystem change observed under the watched root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Phase state as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub current_phase: Option<Phase>,
    pub is_running: bool,
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
