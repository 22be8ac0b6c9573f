use qvault_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("failed to launch repository tool: {0}")]
    Spawn(String),

    #[error("repository tool exited with status {status}: {stderr}")]
    ToolFailed { status: i32, stderr: String },

    #[error("repository tool produced unparseable output: {0}")]
    BadOutput(String),

    #[error("repository tool call timed out")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::Spawn(_) | RepoError::Io(_) | RepoError::TimedOut => ErrorKind::Transient,
            RepoError::ToolFailed { .. } => ErrorKind::Transient,
            RepoError::BadOutput(_) => ErrorKind::BadEncoding,
        }
    }
}

impl qvault_core::error::HasErrorKind for RepoError {
    fn kind(&self) -> ErrorKind {
        RepoError::kind(self)
    }
}
