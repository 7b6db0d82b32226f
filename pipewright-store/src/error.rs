//! Error types for pipewright-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while writing or reading reports.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload could not be serialized.
    #[error("report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A stored report could not be decoded.
    #[error("failed to decode report at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No free file name for this kind/id/second after many attempts.
    #[error("no free report name for '{stem}'")]
    Exhausted { stem: String },
}

/// Convenience constructor for [`PersistenceError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.into(),
        source,
    }
}
