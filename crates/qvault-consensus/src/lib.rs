//! The consent manager (C4): vault configuration, the key-holder registry,
//! and the restore-/deletion-request lifecycles (§3, §4.4).

pub mod deletion;
pub mod error;
pub mod manager;
pub mod request;
pub mod restore;
pub mod vault;

pub use deletion::{DeletionRequest, DeletionType};
pub use error::ConsentError;
pub use manager::ConsentManager;
pub use request::{Approval, ReleasedShare, RequestStatus};
pub use restore::RestoreRequest;
pub use vault::{ConsentMode, KeyHolder, StoredVaultConfig, VaultConfig};
