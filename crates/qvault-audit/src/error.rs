use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit entry serialization failed: {0}")]
    Serialization(String),

    #[error("audit chain link broken at sequence {first_bad_seq}")]
    ChainBroken { first_bad_seq: u64 },

    #[error("audit entry at line {line} is neither valid JSON nor a trailing partial write: {detail}")]
    Corrupt { line: usize, detail: String },
}

impl AuditError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuditError::Io(_) => ErrorKind::Transient,
            AuditError::Serialization(_) => ErrorKind::BadEncoding,
            AuditError::ChainBroken { .. } => ErrorKind::CorruptionDetected,
            AuditError::Corrupt { .. } => ErrorKind::Fatal,
        }
    }
}

impl qvault_core::error::HasErrorKind for AuditError {
    fn kind(&self) -> ErrorKind {
        AuditError::kind(self)
    }
}
