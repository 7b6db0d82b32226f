//! Agent registry and dispatcher.
//!
//! Agents are named task capabilities resolved from a compile-time table
//! ([`capability::builtin`]). The [`Dispatcher`] owns their run state, bounds
//! how many run at once, and persists every [`AgentResult`] before returning it.
//!
//! [`AgentResult`]: pipewright_core::AgentResult

pub mod analysis;
pub mod capability;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod registry;

pub use capability::{Capability, CapabilityRef, TaskContext, TaskOutput};
pub use dispatcher::Dispatcher;
pub use error::{AgentExecutionError, CapabilityError, DispatchError};
pub use registry::{AgentEntry, AgentRegistry, AgentSnapshot};
