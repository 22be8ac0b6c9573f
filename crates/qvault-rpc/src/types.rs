//! Wire-facing DTOs for the "qvault" JSON-RPC namespace. Most methods
//! return the crate types directly since they already round-trip through
//! JSON cleanly; the handful defined here either sanitize secrets out of
//! an internal type or bundle arguments too numerous for a flat parameter
//! list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use qvault_core::types::Timestamp;
use qvault_consensus::{ConsentMode, KeyHolder, VaultConfig};
use qvault_policy::DeletionMode;
use qvault_tickets::{Challenge, Response};

/// Sanitized view of [`VaultConfig`]: never carries `owner_private_key_hex`
/// or `repo_password_hex`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVaultInfo {
    pub owner_name: String,
    pub repo_url: String,
    pub threshold_k: u8,
    pub total_n: u8,
    pub key_holders: Vec<KeyHolder>,
    pub require_approval: bool,
    pub consent_mode: ConsentMode,
    pub strict_deletion_reconciliation: bool,
}

impl From<VaultConfig> for RpcVaultInfo {
    fn from(v: VaultConfig) -> Self {
        RpcVaultInfo {
            owner_name: v.owner_name,
            repo_url: v.repo_url,
            threshold_k: v.threshold_k,
            total_n: v.total_n,
            key_holders: v.key_holders,
            require_approval: v.require_approval,
            consent_mode: v.consent_mode,
            strict_deletion_reconciliation: v.strict_deletion_reconciliation,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRegisterKeyHolder {
    pub name: String,
    pub public_key: String,
    pub network_address: Option<String>,
    pub is_owner: bool,
    pub joined_at: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreateDeletionRequest {
    pub requester: String,
    pub deletion_type: qvault_consensus::DeletionType,
    pub snapshot_ids: Vec<String>,
    pub paths: Vec<String>,
    pub reason: String,
    pub required_approvals: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcCreatePolicy {
    pub owner_name: String,
    pub owner_key_id: String,
    pub owner_public_key: String,
    pub host_name: String,
    pub host_key_id: String,
    pub host_public_key: String,
    pub retention_days: u32,
    pub deletion_mode: DeletionMode,
    pub max_storage_bytes: u64,
    pub valid_until: Option<Timestamp>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcVerifyChallenge {
    pub challenge: Challenge,
    pub response: Response,
    pub host_public_key: String,
    /// The owner's own copy of each challenged blob, hex-encoded, keyed by
    /// blob id, used to recompute the expected digest.
    pub contents_hex: HashMap<String, String>,
}
