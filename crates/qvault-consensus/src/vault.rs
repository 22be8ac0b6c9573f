//! `VaultConfig` and the key-holder registry (§3, §9 "the consent manager's
//! two modes are parallel state machines implemented as one lifecycle with
//! a strategy object chosen at vault-init time").

use serde::{Deserialize, Serialize};

use qvault_core::constants::SHARING_MAX_N;
use qvault_core::raw::WithExtra;
use qvault_core::types::{KeyHolderId, Timestamp};
use qvault_crypto::hash::key_holder_id_from_public_hex;

use crate::error::ConsentError;

/// Which lifecycle strategy the consent manager uses for this vault
/// (§4.4 "legacy 2-of-2 SSS mode"). Chosen once at vault init and fixed for
/// the vault's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentMode {
    /// Threshold signature aggregation over registered key-holder keys.
    SignatureConsensus,
    /// Backward-compatible raw-share release between exactly two holders.
    LegacyShareRelease,
}

/// A registered participant in the vault's consensus (§3 KeyHolder).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyHolder {
    pub id: KeyHolderId,
    pub name: String,
    pub public_key: String,
    #[serde(default)]
    pub network_address: Option<String>,
    pub joined_at: Timestamp,
    pub is_owner: bool,
}

impl KeyHolder {
    /// Derives `id` from `public_key` so it can never be supplied
    /// independently of the key it names (§3 invariant).
    pub fn new(name: String, public_key: String, network_address: Option<String>, joined_at: Timestamp, is_owner: bool) -> Result<Self, ConsentError> {
        let id = key_holder_id_from_public_hex(&public_key).map_err(|e| ConsentError::BadInput(e.to_string()))?;
        Ok(Self {
            id,
            name,
            public_key,
            network_address,
            joined_at,
            is_owner,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    pub owner_name: String,
    pub repo_url: String,
    /// Owner's Ed25519 private key, hex-encoded. Local-only; never
    /// serialised out to a peer or the storage host.
    pub owner_private_key_hex: String,
    /// Repository password. Owner-only; never leaves the owner process.
    pub repo_password_hex: String,
    pub threshold_k: u8,
    pub total_n: u8,
    pub key_holders: Vec<KeyHolder>,
    pub require_approval: bool,
    pub consent_mode: ConsentMode,
    /// §9 open question (a): whether a deletion request's threshold
    /// approval must be satisfied *in addition to* the storage guard's
    /// active `owner-only` policy path, rather than either one alone.
    /// Defaults to `true` (the stricter reading).
    #[serde(default = "default_strict_reconciliation")]
    pub strict_deletion_reconciliation: bool,
}

fn default_strict_reconciliation() -> bool {
    true
}

/// Persisted form, preserving fields unknown to this build (§9).
pub type StoredVaultConfig = WithExtra<VaultConfig>;

impl VaultConfig {
    pub fn new(
        owner_name: String,
        repo_url: String,
        owner_private_key_hex: String,
        repo_password_hex: String,
        threshold_k: u8,
        total_n: u8,
        require_approval: bool,
        consent_mode: ConsentMode,
    ) -> Result<Self, ConsentError> {
        if threshold_k == 0 || threshold_k > total_n || total_n > SHARING_MAX_N {
            return Err(ConsentError::ThresholdTooHigh { k: threshold_k, n: total_n });
        }
        Ok(Self {
            owner_name,
            repo_url,
            owner_private_key_hex,
            repo_password_hex,
            threshold_k,
            total_n,
            key_holders: Vec::new(),
            require_approval,
            consent_mode,
            strict_deletion_reconciliation: true,
        })
    }

    /// Registers a new key-holder, enforcing `|key_holders| ≤ n` and
    /// "exactly one owner" (§3). Append-only: there is no remove operation,
    /// matching "the set of key-holders is append-only within a vault's
    /// lifetime".
    pub fn register_key_holder(&mut self, holder: KeyHolder) -> Result<(), ConsentError> {
        if self.key_holders.len() >= self.total_n as usize {
            return Err(ConsentError::TooManyKeyHolders {
                count: self.key_holders.len() + 1,
                n: self.total_n,
            });
        }
        if holder.is_owner && self.key_holders.iter().any(|h| h.is_owner) {
            return Err(ConsentError::NotExactlyOneOwner);
        }
        self.key_holders.push(holder);
        Ok(())
    }

    pub fn find_key_holder(&self, id: &KeyHolderId) -> Option<&KeyHolder> {
        self.key_holders.iter().find(|h| &h.id == id)
    }

    pub fn owner(&self) -> Option<&KeyHolder> {
        self.key_holders.iter().find(|h| h.is_owner)
    }

    /// `required_approvals` for a fresh restore request: the vault's
    /// threshold, or 1 under legacy 2-of-2 mode (§4.4).
    pub fn restore_required_approvals(&self) -> u32 {
        match self.consent_mode {
            ConsentMode::SignatureConsensus => self.threshold_k as u32,
            ConsentMode::LegacyShareRelease => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvault_crypto::KeyPair;

    fn holder(name: &str, is_owner: bool) -> KeyHolder {
        let kp = KeyPair::generate();
        KeyHolder::new(name.to_string(), kp.public_hex(), None, 1_700_000_000, is_owner).unwrap()
    }

    #[test]
    fn bad_threshold_rejected() {
        assert!(VaultConfig::new(
            "alice".into(),
            "repo://x".into(),
            "ab".into(),
            "cd".into(),
            3,
            2,
            true,
            ConsentMode::SignatureConsensus,
        )
        .is_err());
    }

    #[test]
    fn register_enforces_capacity_and_single_owner() {
        let mut vault = VaultConfig::new(
            "alice".into(),
            "repo://x".into(),
            "ab".into(),
            "cd".into(),
            2,
            2,
            true,
            ConsentMode::SignatureConsensus,
        )
        .unwrap();

        vault.register_key_holder(holder("alice", true)).unwrap();
        assert!(matches!(
            vault.register_key_holder(holder("mallory", true)),
            Err(ConsentError::NotExactlyOneOwner)
        ));
        vault.register_key_holder(holder("bob", false)).unwrap();
        assert!(matches!(
            vault.register_key_holder(holder("carol", false)),
            Err(ConsentError::TooManyKeyHolders { .. })
        ));
    }

    #[test]
    fn key_holder_id_is_derived_from_public_key() {
        let kp = KeyPair::generate();
        let h = KeyHolder::new("alice".into(), kp.public_hex(), None, 1_700_000_000, true).unwrap();
        assert_eq!(h.id, kp.key_holder_id);
    }
}
