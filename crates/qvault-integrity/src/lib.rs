//! Content-hash integrity checking, owner-signed verification records, and
//! the scheduled checker task (C6).

pub mod check;
pub mod error;
pub mod merkle;
pub mod record;
pub mod scheduler;

pub use check::{check_data_integrity, quick_check, DataIntegrityReport, QuickCheckReport};
pub use error::IntegrityError;
pub use merkle::merkle_root;
pub use record::{create_verification_record, verify_against_record, RecordStore, VerificationRecord, VerifyAgainstReport};
pub use scheduler::{AlertSink, CheckOutcome, CheckType, CheckerStatus, NoopAlertSink, ScheduledChecker, VerificationConfig, WebhookAlertSink};
