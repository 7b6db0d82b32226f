//! Error types for pipewright-agents.

use std::path::PathBuf;

use pipewright_core::{AgentName, AgentResult};
use pipewright_store::PersistenceError;
use thiserror::Error;

/// Rejections and failures surfaced by [`crate::Dispatcher::dispatch`].
///
/// Capability failures are not in this enum: they come back as a failed
/// [`AgentResult`] carrying an [`AgentExecutionError`] message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("agent '{0}' is not registered")]
    AgentNotFound(AgentName),

    #[error("agent '{0}' is disabled by configuration")]
    AgentDisabled(AgentName),

    #[error("agent '{0}' is already running")]
    AgentBusy(AgentName),

    #[error("dispatch pool is closed")]
    PoolClosed,

    /// The capability ran but its result could not be stored.
    #[error("failed to persist result of agent '{}': {source}", result.agent)]
    Persistence {
        result: Box<AgentResult>,
        #[source]
        source: PersistenceError,
    },
}

/// Errors raised inside a capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability '{capability}' does not support task '{task}'")]
    UnsupportedTask { capability: String, task: String },

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from a [`crate::generator::ContentGenerator`].
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("template engine error: {0}")]
    Template(#[from] tera::Error),

    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("provider '{0}' is not available")]
    Provider(String),
}

/// A capability failure, as recorded in a failed [`AgentResult`].
#[derive(Debug, Error)]
#[error("agent execution error in '{agent}': {message}")]
pub struct AgentExecutionError {
    pub agent: AgentName,
    pub message: String,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CapabilityError {
    CapabilityError::Io {
        path: path.into(),
        source,
    }
}
