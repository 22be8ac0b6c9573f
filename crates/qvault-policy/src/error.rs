use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy is missing one or both signatures")]
    UnsignedPolicy,

    #[error("owner signature does not verify")]
    BadOwnerSignature,

    #[error("host signature does not verify")]
    BadHostSignature,

    #[error("deletion is disallowed by the active policy's deletion mode")]
    DeletionDisallowed,

    #[error("no active policy is set")]
    NoActivePolicy,

    #[error("canonical payload construction failed: {0}")]
    Serialization(String),

    #[error("unknown deletion mode: {0}")]
    UnknownDeletionMode(String),
}

impl PolicyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PolicyError::UnsignedPolicy => ErrorKind::UnsignedPolicy,
            PolicyError::BadOwnerSignature | PolicyError::BadHostSignature => ErrorKind::BadSignature,
            PolicyError::DeletionDisallowed => ErrorKind::BadState,
            PolicyError::NoActivePolicy => ErrorKind::BadState,
            PolicyError::Serialization(_) => ErrorKind::BadEncoding,
            PolicyError::UnknownDeletionMode(_) => ErrorKind::BadInput,
        }
    }
}

impl qvault_core::error::HasErrorKind for PolicyError {
    fn kind(&self) -> ErrorKind {
        PolicyError::kind(self)
    }
}

impl From<qvault_crypto::SigError> for PolicyError {
    fn from(e: qvault_crypto::SigError) -> Self {
        PolicyError::Serialization(e.to_string())
    }
}
