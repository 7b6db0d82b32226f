//! Pipeline runtime: phase state machine, file-watch trigger, status loop,
//! and the watch-mode runtime that ties them together.

pub mod dashboard;
mod error;
pub mod logging;
pub mod orchestrator;
pub mod phase;
mod runtime;
pub mod watch;

pub use error::{DaemonError, PipelineError};
pub use orchestrator::{Orchestrator, PipelineSnapshot};
pub use phase::Step;
pub use runtime::run_watch;
pub use watch::{ReactionHandler, Route, WatchHandle, WatchTrigger};
