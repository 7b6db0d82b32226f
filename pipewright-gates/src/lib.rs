//! Validation gates: named pass/fail checks and the engine that runs them
//! under a hard deadline and records every result.

pub mod check;
pub mod engine;
pub mod error;
pub mod external;
pub mod local;
pub mod placeholder;

pub use check::{CheckOutcome, GateCheck};
pub use engine::GateEngine;
pub use error::{CheckError, GateError};
pub use external::{ArchitectureCheck, CommandSpec};
pub use local::{CodeQualityCheck, RequirementsCheck, SecurityCheck};
pub use placeholder::PlaceholderCheck;
