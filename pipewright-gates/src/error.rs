//! Error types for pipewright-gates.

use std::path::PathBuf;

use pipewright_core::{Gate, GateResult};
use pipewright_store::PersistenceError;
use thiserror::Error;

/// Errors surfaced by [`crate::GateEngine`].
///
/// `Timeout` and `Check` never escape `run_gate`: they are rendered into the
/// diagnostics of a failed [`GateResult`].
#[derive(Debug, Error)]
pub enum GateError {
    #[error("unknown gate '{0}'")]
    UnknownGate(String),

    #[error("timeout after {secs}s")]
    Timeout { gate: Gate, secs: f64 },

    #[error("{gate} check failed to run: {message}")]
    Check { gate: Gate, message: String },

    /// The gate ran but its result could not be stored.
    #[error("failed to persist {} gate result: {source}", result.gate)]
    Persistence {
        result: Box<GateResult>,
        #[source]
        source: PersistenceError,
    },
}

/// Errors raised by an individual check implementation.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("check task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CheckError {
    CheckError::Io {
        path: path.into(),
        source,
    }
}
