//! Pipewright core library: pipeline domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: phases, gates, agent status, result records
//! - [`config`]: `config/pipeline_config.json` load / save / defaults
//! - [`layout`]: working-directory layout under a project root
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod layout;
pub mod types;

pub use config::{AgentSettings, GateSetting, PipelineConfig};
pub use error::ConfigError;
pub use types::{
    AgentName, AgentResult, AgentStatus, Gate, GateResult, ParseNameError, Phase, PhaseResult,
    PipelineStatus, WatchEvent, WatchEventKind,
};
