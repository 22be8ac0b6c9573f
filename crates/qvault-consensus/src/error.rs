use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsentError {
    #[error("signature does not verify for key-holder {0}")]
    BadSignature(String),

    #[error("key-holder {0} already signed this request")]
    AlreadySigned(String),

    #[error("key-holder {0} is not registered with this vault")]
    UnknownKeyHolder(String),

    #[error("request {0} not found")]
    NotFound(String),

    #[error("request {0} is not pending (current state forbids this transition)")]
    BadState(String),

    #[error("vault threshold misconfigured: k={k} n={n}")]
    ThresholdTooHigh { k: u8, n: u8 },

    #[error("key-holder count {count} exceeds vault total n={n}")]
    TooManyKeyHolders { count: usize, n: u8 },

    #[error("a vault must have exactly one owner key-holder")]
    NotExactlyOneOwner,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signature primitive error: {0}")]
    Sig(#[from] qvault_crypto::SigError),

    #[error("secret-sharing error: {0}")]
    Sharing(#[from] qvault_sharing::ShareError),

    #[error("malformed input: {0}")]
    BadInput(String),
}

impl ConsentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsentError::BadSignature(_) | ConsentError::Sig(_) => ErrorKind::BadSignature,
            ConsentError::AlreadySigned(_) => ErrorKind::Conflict,
            ConsentError::UnknownKeyHolder(_) => ErrorKind::NotFound,
            ConsentError::NotFound(_) => ErrorKind::NotFound,
            ConsentError::BadState(_) => ErrorKind::BadState,
            ConsentError::ThresholdTooHigh { .. } => ErrorKind::ResourceLimit,
            ConsentError::TooManyKeyHolders { .. } | ConsentError::NotExactlyOneOwner => ErrorKind::BadInput,
            ConsentError::Io(_) => ErrorKind::Transient,
            ConsentError::Sharing(_) => ErrorKind::BadInput,
            ConsentError::BadInput(_) => ErrorKind::BadInput,
        }
    }
}

impl qvault_core::error::HasErrorKind for ConsentError {
    fn kind(&self) -> ErrorKind {
        ConsentError::kind(self)
    }
}
