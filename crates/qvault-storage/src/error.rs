//! Error taxonomy for the storage guard (C9), plus the HTTP status mapping
//! its wire surface (§6) commits to: 400 malformed path, 403 policy/
//! append-only violation, 404 not found, 409 hash mismatch, 507 quota
//! exceeded.

use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("malformed blob path: {0}")]
    BadPath(String),

    #[error("blob {path} not found")]
    NotFound { path: String },

    #[error("content hash mismatch: path names {expected} but contents hash to {got}")]
    HashMismatch { expected: String, got: String },

    #[error("append-only violation: {0} already holds different contents")]
    AppendOnlyViolation(String),

    #[error("quota exceeded: {used} + {incoming} > {quota} bytes")]
    QuotaExceeded { used: u64, incoming: u64, quota: u64 },

    #[error("no active policy is set; deletes are refused until one is")]
    NoActivePolicy,

    #[error("deletion is disallowed by the active policy's deletion mode")]
    DeletionDisallowed,

    #[error("deletion authorization missing or invalid: {0}")]
    BadDeletionAuthorization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Policy(#[from] qvault_policy::PolicyError),

    #[error(transparent)]
    Ticket(#[from] qvault_tickets::TicketError),

    #[error(transparent)]
    Audit(#[from] qvault_audit::AuditError),

    #[error(transparent)]
    Consent(#[from] qvault_consensus::ConsentError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::BadPath(_) => ErrorKind::BadInput,
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::HashMismatch { .. } => ErrorKind::Conflict,
            StorageError::AppendOnlyViolation(_) => ErrorKind::Conflict,
            StorageError::QuotaExceeded { .. } => ErrorKind::ResourceLimit,
            StorageError::NoActivePolicy | StorageError::DeletionDisallowed => ErrorKind::BadState,
            StorageError::BadDeletionAuthorization(_) => ErrorKind::BadState,
            StorageError::Io(_) => ErrorKind::Transient,
            StorageError::Policy(e) => e.kind(),
            StorageError::Ticket(e) => e.kind(),
            StorageError::Audit(e) => e.kind(),
            StorageError::Consent(e) => e.kind(),
        }
    }

    /// The status code the wire surface (§6) commits to for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            StorageError::BadPath(_) => 400,
            StorageError::NotFound { .. } => 404,
            StorageError::HashMismatch { .. } => 409,
            StorageError::AppendOnlyViolation(_) => 403,
            StorageError::QuotaExceeded { .. } => 507,
            StorageError::NoActivePolicy
            | StorageError::DeletionDisallowed
            | StorageError::BadDeletionAuthorization(_) => 403,
            StorageError::Io(_) => 500,
            StorageError::Policy(_) | StorageError::Ticket(_) | StorageError::Audit(_) | StorageError::Consent(_) => 403,
        }
    }
}

impl qvault_core::error::HasErrorKind for StorageError {
    fn kind(&self) -> ErrorKind {
        StorageError::kind(self)
    }
}
