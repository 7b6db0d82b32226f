//! Error types for pipewright-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or saving the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load: includes file path and line context from serde_json.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error (save path).
    #[error("configuration serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The document parsed but holds a value the pipeline cannot run with.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
