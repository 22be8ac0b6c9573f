//! Shared request-lifecycle pieces used by both `RestoreRequest` and
//! `DeletionRequest` (§3, §4.4): status, one recorded approval, and the
//! legacy share-release payload.

use serde::{Deserialize, Serialize};

use qvault_core::types::{KeyHolderId, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Approval {
    pub key_holder_id: KeyHolderId,
    pub name: String,
    pub signature: String,
    pub at: Timestamp,
}

/// A key-holder's raw Shamir share released into a request under legacy
/// 2-of-2 mode (§4.4 "a backward-compatible path accepts an `approve(id,
/// holder, share_data)`").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReleasedShare {
    pub key_holder_id: KeyHolderId,
    pub index: u8,
    pub data_hex: String,
    pub at: Timestamp,
}

pub fn generate_request_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; qvault_core::constants::REQUEST_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
