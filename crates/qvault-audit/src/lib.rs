//! Hash-chained append-only audit log of storage-side mutations (C7).

pub mod chain;
pub mod error;

pub use chain::{AuditEntry, Chain, VerifyResult};
pub use error::AuditError;
