//! Two-party signed storage policy (C5): retention, deletion mode, and
//! quota, jointly agreed by the vault owner and the storage host.

use serde::{Deserialize, Serialize};

use qvault_core::raw::WithExtra;
use qvault_core::types::Timestamp;
use qvault_crypto::canonical::canonical_payload;
use qvault_crypto::keypair::{verify, KeyPair};

use crate::error::PolicyError;

const SIGNATURE_FIELDS: [&str; 2] = ["owner_signature", "host_signature"];

/// What deletions the storage guard is permitted to honour while this
/// policy is active (§4.9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionMode {
    BothRequired,
    OwnerOnly,
    TimeLockOnly,
    Never,
}

impl std::str::FromStr for DeletionMode {
    type Err = PolicyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both-required" => Ok(DeletionMode::BothRequired),
            "owner-only" => Ok(DeletionMode::OwnerOnly),
            "time-lock-only" => Ok(DeletionMode::TimeLockOnly),
            "never" => Ok(DeletionMode::Never),
            other => Err(PolicyError::UnknownDeletionMode(other.to_string())),
        }
    }
}

/// One party's identity triple as carried inside a policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub key_id: String,
    pub public_key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Policy {
    pub owner: Identity,
    pub host: Identity,
    pub retention_days: u32,
    pub deletion_mode: DeletionMode,
    pub max_storage_bytes: u64,
    pub created_at: Timestamp,
    /// Optional end of the policy's validity window; `None` means it never
    /// expires on its own (it is only ever replaced by `set_policy`).
    #[serde(default)]
    pub valid_until: Option<Timestamp>,
    #[serde(default)]
    pub owner_signature: Option<String>,
    #[serde(default)]
    pub host_signature: Option<String>,
}

/// Persisted form, preserving fields unknown to this build (§9).
pub type StoredPolicy = WithExtra<Policy>;

impl Policy {
    pub fn new(
        owner: Identity,
        host: Identity,
        retention_days: u32,
        deletion_mode: DeletionMode,
        max_storage_bytes: u64,
        created_at: Timestamp,
        valid_until: Option<Timestamp>,
    ) -> Self {
        Self {
            owner,
            host,
            retention_days,
            deletion_mode,
            max_storage_bytes,
            created_at,
            valid_until,
            owner_signature: None,
            host_signature: None,
        }
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, PolicyError> {
        canonical_payload(self, &SIGNATURE_FIELDS).map_err(PolicyError::from)
    }

    pub fn sign_as_owner(&mut self, kp: &KeyPair) -> Result<(), PolicyError> {
        let bytes = self.canonical_bytes()?;
        self.owner_signature = Some(kp.sign(&bytes));
        Ok(())
    }

    pub fn sign_as_host(&mut self, kp: &KeyPair) -> Result<(), PolicyError> {
        let bytes = self.canonical_bytes()?;
        self.host_signature = Some(kp.sign(&bytes));
        Ok(())
    }

    pub fn is_fully_signed(&self) -> bool {
        matches!(&self.owner_signature, Some(s) if !s.is_empty())
            && matches!(&self.host_signature, Some(s) if !s.is_empty())
    }

    /// Verifies both signatures against the stored public keys over the
    /// canonical payload. Either failure is reported distinctly so a caller
    /// can tell which party's signature is bad.
    pub fn verify(&self) -> Result<(), PolicyError> {
        if !self.is_fully_signed() {
            return Err(PolicyError::UnsignedPolicy);
        }
        let bytes = self.canonical_bytes()?;
        let owner_sig = self.owner_signature.as_deref().unwrap();
        let host_sig = self.host_signature.as_deref().unwrap();

        verify(&self.owner.public_key, &bytes, owner_sig).map_err(|_| PolicyError::BadOwnerSignature)?;
        verify(&self.host.public_key, &bytes, host_sig).map_err(|_| PolicyError::BadHostSignature)?;
        Ok(())
    }

    /// Fully signed and, if a validity window is set, still within it.
    pub fn is_active(&self, now: Timestamp) -> bool {
        if !self.is_fully_signed() {
            return false;
        }
        match self.valid_until {
            Some(until) => now <= until,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(kp: &KeyPair, name: &str) -> Identity {
        Identity {
            name: name.to_string(),
            key_id: kp.key_holder_id.to_hex(),
            public_key: kp.public_hex(),
        }
    }

    #[test]
    fn unsigned_policy_fails_verify() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();
        let policy = Policy::new(
            identity(&owner_kp, "alice"),
            identity(&host_kp, "host"),
            30,
            DeletionMode::BothRequired,
            1_000_000,
            1_700_000_000,
            None,
        );
        assert!(matches!(policy.verify(), Err(PolicyError::UnsignedPolicy)));
        assert!(!policy.is_active(1_700_000_001));
    }

    #[test]
    fn fully_signed_policy_verifies_and_is_active() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();
        let mut policy = Policy::new(
            identity(&owner_kp, "alice"),
            identity(&host_kp, "host"),
            30,
            DeletionMode::BothRequired,
            1_000_000,
            1_700_000_000,
            Some(1_800_000_000),
        );
        policy.sign_as_owner(&owner_kp).unwrap();
        policy.sign_as_host(&host_kp).unwrap();
        assert!(policy.is_fully_signed());
        assert!(policy.verify().is_ok());
        assert!(policy.is_active(1_700_000_001));
        assert!(!policy.is_active(1_800_000_001));
    }

    #[test]
    fn tampered_field_invalidates_owner_signature() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();
        let mut policy = Policy::new(
            identity(&owner_kp, "alice"),
            identity(&host_kp, "host"),
            30,
            DeletionMode::BothRequired,
            1_000_000,
            1_700_000_000,
            None,
        );
        policy.sign_as_owner(&owner_kp).unwrap();
        policy.sign_as_host(&host_kp).unwrap();
        policy.retention_days = 9999;
        assert!(matches!(policy.verify(), Err(PolicyError::BadOwnerSignature)));
    }

    #[test]
    fn deletion_mode_parses_known_strings_and_rejects_unknown() {
        use std::str::FromStr;
        assert_eq!(DeletionMode::from_str("owner-only").unwrap(), DeletionMode::OwnerOnly);
        assert!(DeletionMode::from_str("whenever").is_err());
    }
}
