use std::path::PathBuf;

use pipewright_core::{ConfigError, Phase, PhaseResult};
use pipewright_store::PersistenceError;
use thiserror::Error;

/// Errors from [`crate::Orchestrator::run_phase`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is busy running phase '{current}'")]
    PipelineBusy { current: Phase },

    /// The phase ran but its result could not be stored.
    #[error("failed to persist {} phase result: {source}", result.phase)]
    Persistence {
        result: Box<PhaseResult>,
        #[source]
        source: PersistenceError,
    },
}

/// Error surface for startup, watching and the watch-mode runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to watch {path}: {source}")]
    WatchSetup {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("runtime error: {0}")]
    Runtime(String),
}
