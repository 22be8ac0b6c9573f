use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("ticket does not carry a valid owner signature")]
    BadSignature,

    #[error("ticket {0} not found")]
    NotFound(String),

    #[error("ticket {0} has expired")]
    Expired(String),

    #[error("ticket {0} was already used against this target")]
    AlreadyUsed(String),

    #[error("challenge {0} not found")]
    ChallengeNotFound(String),

    #[error("challenge {0} has expired")]
    ChallengeExpired(String),

    #[error("host response signature does not verify")]
    BadResponseSignature,

    #[error("response digest mismatch for blob {0}")]
    DigestMismatch(String),

    #[error("response missing blob {0}")]
    MissingBlob(String),

    #[error("canonical payload construction failed: {0}")]
    Serialization(String),
}

impl TicketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketError::BadSignature | TicketError::BadResponseSignature => ErrorKind::BadSignature,
            TicketError::NotFound(_) | TicketError::ChallengeNotFound(_) => ErrorKind::NotFound,
            TicketError::Expired(_) | TicketError::ChallengeExpired(_) => ErrorKind::BadState,
            TicketError::AlreadyUsed(_) => ErrorKind::Conflict,
            TicketError::DigestMismatch(_) | TicketError::MissingBlob(_) => ErrorKind::CorruptionDetected,
            TicketError::Serialization(_) => ErrorKind::BadEncoding,
        }
    }
}

impl qvault_core::error::HasErrorKind for TicketError {
    fn kind(&self) -> ErrorKind {
        TicketError::kind(self)
    }
}

impl From<qvault_crypto::SigError> for TicketError {
    fn from(e: qvault_crypto::SigError) -> Self {
        TicketError::Serialization(e.to_string())
    }
}
