//! # pipewright-store
//!
//! Durable, append-only report persistence.
//!
//! Call [`ReportStore::record`] with a [`ReportKind`], an identifier and any
//! serializable payload; the returned [`ReportHandle`] names the file and
//! carries the SHA-256 of the bytes that reached the disk.

pub mod error;
pub mod store;

pub use error::PersistenceError;
pub use store::{ReportHandle, ReportKind, ReportStore};
