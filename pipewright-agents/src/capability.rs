//! The task interface every agent implements, and the compile-time table of
//! built-in capabilities.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pipewright_core::AgentSettings;
use serde_json::Value;

use crate::contract::ContractGenerator;
use crate::error::{CapabilityError, GenerationError};

pub const CONTRACT_GENERATOR: &str = "contract_generator";

/// What a capability sees besides its task and arguments.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub project_root: PathBuf,
    pub settings: AgentSettings,
}

/// Successful return of a capability run.
///
/// `success = false` is a normal outcome (the task ran and judged its own
/// output unfit); an `Err` from [`Capability::run`] is an execution failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutput {
    pub success: bool,
    pub payload: Value,
    pub error: Option<String>,
}

impl TaskOutput {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    async fn run(
        &self,
        task: &str,
        args: &Value,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, CapabilityError>;
}

/// An agent's capability slot.
#[derive(Clone)]
pub enum CapabilityRef {
    Installed(Arc<dyn Capability>),
    /// No implementation is compiled in for this agent name.
    Unimplemented,
}

impl CapabilityRef {
    pub fn is_installed(&self) -> bool {
        matches!(self, CapabilityRef::Installed(_))
    }
}

impl fmt::Debug for CapabilityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityRef::Installed(_) => f.write_str("Installed"),
            CapabilityRef::Unimplemented => f.write_str("Unimplemented"),
        }
    }
}

/// Resolve the built-in capability for `name`.
///
/// Names without an implementation map to [`CapabilityRef::Unimplemented`].
pub fn builtin(name: &str, ctx: &TaskContext) -> Result<CapabilityRef, GenerationError> {
    match name {
        CONTRACT_GENERATOR => {
            let generator = ContractGenerator::for_project(&ctx.project_root, &ctx.settings)?;
            Ok(CapabilityRef::Installed(Arc::new(generator)))
        }
        _ => Ok(CapabilityRef::Unimplemented),
    }
}
