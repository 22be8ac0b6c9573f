use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("threshold k must be between 1 and n (<=16); got k={k} n={n}")]
    BadThreshold { k: u8, n: u8 },

    #[error("secret must be nonempty")]
    EmptySecret,

    #[error("need at least {need} shares to combine, got {got}")]
    ShareTooFew { need: u8, got: usize },

    #[error("duplicate share index {0}")]
    DuplicateIndex(u8),

    #[error("share data lengths diverge")]
    ShareLengthMismatch,
}

impl ShareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShareError::BadThreshold { .. } | ShareError::EmptySecret => ErrorKind::BadInput,
            ShareError::ShareTooFew { .. } | ShareError::ShareLengthMismatch => ErrorKind::BadInput,
            ShareError::DuplicateIndex(_) => ErrorKind::Conflict,
        }
    }
}

impl qvault_core::error::HasErrorKind for ShareError {
    fn kind(&self) -> ErrorKind {
        ShareError::kind(self)
    }
}
