use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigError {
    #[error("invalid hex encoding: {0}")]
    BadEncoding(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public or private key bytes")]
    BadKey,

    #[error("canonical payload serialization failed: {0}")]
    Serialization(String),
}

impl SigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SigError::BadEncoding(_) | SigError::BadKey | SigError::Serialization(_) => {
                ErrorKind::BadEncoding
            }
            SigError::InvalidSignature => ErrorKind::BadSignature,
        }
    }
}

impl qvault_core::error::HasErrorKind for SigError {
    fn kind(&self) -> ErrorKind {
        SigError::kind(self)
    }
}
