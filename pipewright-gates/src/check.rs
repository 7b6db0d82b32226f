//! The check interface implemented by every gate.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use pipewright_core::{Gate, GateResult};
use serde_json::{Map, Value};

use crate::error::CheckError;

#[async_trait]
pub trait GateCheck: Send + Sync {
    fn gate(&self) -> Gate;

    /// Inspect the project at `root`. An `Err` means the check could not run,
    /// not that the project failed it.
    async fn check(&self, root: &Path) -> Result<CheckOutcome, CheckError>;
}

/// What a check found, before the engine stamps it into a [`GateResult`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckOutcome {
    pub passed: bool,
    pub diagnostics: Vec<String>,
    pub details: Map<String, Value>,
}

impl CheckOutcome {
    pub fn passed(diagnostic: impl Into<String>) -> Self {
        Self {
            passed: true,
            diagnostics: vec![diagnostic.into()],
            details: Map::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn into_result(self, gate: Gate) -> GateResult {
        GateResult {
            gate,
            passed: self.passed,
            diagnostics: self.diagnostics,
            details: self.details,
            timestamp: Utc::now(),
        }
    }
}

/// One line of a check's `checks` detail list.
pub(crate) fn check_entry(name: &str, passed: bool) -> Value {
    serde_json::json!({ "check": name, "passed": passed })
}
