use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("I/O error walking repository: {0}")]
    Io(#[from] std::io::Error),

    #[error("verification record carries no signature")]
    UnsignedRecord,

    #[error("verification record signature does not verify")]
    BadSignature,

    #[error("a verification record already exists for snapshot {0}")]
    DuplicateSnapshot(String),

    #[error("no verification record found for snapshot {0}")]
    NotFound(String),

    #[error("data corruption detected: {0}")]
    CorruptionDetected(String),

    #[error("canonical payload construction failed: {0}")]
    Serialization(String),
}

impl IntegrityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IntegrityError::Io(_) => ErrorKind::Transient,
            IntegrityError::UnsignedRecord => ErrorKind::UnsignedRecord,
            IntegrityError::BadSignature => ErrorKind::BadSignature,
            IntegrityError::DuplicateSnapshot(_) => ErrorKind::Conflict,
            IntegrityError::NotFound(_) => ErrorKind::NotFound,
            IntegrityError::CorruptionDetected(_) => ErrorKind::CorruptionDetected,
            IntegrityError::Serialization(_) => ErrorKind::BadEncoding,
        }
    }
}

impl qvault_core::error::HasErrorKind for IntegrityError {
    fn kind(&self) -> ErrorKind {
        IntegrityError::kind(self)
    }
}

impl From<qvault_crypto::SigError> for IntegrityError {
    fn from(e: qvault_crypto::SigError) -> Self {
        IntegrityError::Serialization(e.to_string())
    }
}
