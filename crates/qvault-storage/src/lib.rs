//! Content-addressed, quota-enforced, append-only blob storage for a
//! vault's storage host (C9), and the HTTP surface a host exposes it
//! through.

pub mod error;
pub mod guard;
pub mod http;
pub mod layout;

pub use error::StorageError;
pub use guard::{DeleteAuthorization, PutOutcome, StorageGuard};
pub use http::router;
