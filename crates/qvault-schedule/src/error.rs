use qvault_core::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cron field value {value} out of range [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },

    #[error("cron step must be nonzero")]
    BadStep,

    #[error("cron range end {end} is before start {start}")]
    BadRange { start: i64, end: i64 },

    #[error("unrecognised schedule expression: {0}")]
    BadFormat(String),

    #[error("interval {secs}s is outside the accepted range [{min}, {max}] seconds")]
    IntervalOutOfRange { secs: i64, min: i64, max: i64 },

    #[error("next_run could not find a matching time within the lookahead bound")]
    LookaheadExceeded,

    #[error("retry budget exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    #[error("backup run failed: {0}")]
    BackupFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScheduleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScheduleError::OutOfRange { .. }
            | ScheduleError::BadStep
            | ScheduleError::BadRange { .. }
            | ScheduleError::BadFormat(_)
            | ScheduleError::IntervalOutOfRange { .. } => ErrorKind::BadInput,
            ScheduleError::LookaheadExceeded => ErrorKind::BadState,
            ScheduleError::RetryExhausted { .. } => ErrorKind::Transient,
            ScheduleError::BackupFailed(_) => ErrorKind::Transient,
            ScheduleError::Io(_) => ErrorKind::Transient,
        }
    }
}

impl qvault_core::error::HasErrorKind for ScheduleError {
    fn kind(&self) -> ErrorKind {
        ScheduleError::kind(self)
    }
}
