//! The consent manager (C4): owns the restore- and deletion-request maps,
//! the vault configuration and key-holder registry, and persists every
//! request to its own `<id>.json` file (§4.4).

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use qvault_core::types::{KeyHolderId, Timestamp};
use qvault_core::FileStore;

use crate::deletion::{DeletionRequest, DeletionType};
use crate::error::ConsentError;
use crate::request::RequestStatus;
use crate::restore::RestoreRequest;
use crate::vault::{KeyHolder, VaultConfig};

pub struct ConsentManager {
    vault: RwLock<VaultConfig>,
    restore_store: FileStore,
    deletion_store: FileStore,
    restore_cache: RwLock<HashMap<String, RestoreRequest>>,
    deletion_cache: RwLock<HashMap<String, DeletionRequest>>,
}

impl ConsentManager {
    /// Opens the consent manager's on-disk stores under `requests_dir`
    /// (`<requests_dir>/restore/` and `<requests_dir>/deletion/`), loading
    /// every persisted request into memory.
    pub fn open(vault: VaultConfig, requests_dir: &Path) -> Result<Self, ConsentError> {
        let restore_store = FileStore::open(requests_dir.join("restore"))?;
        let deletion_store = FileStore::open(requests_dir.join("deletion"))?;

        let restore_cache: HashMap<String, RestoreRequest> = restore_store.load_all()?.into_iter().collect();
        let deletion_cache: HashMap<String, DeletionRequest> = deletion_store.load_all()?.into_iter().collect();

        Ok(Self {
            vault: RwLock::new(vault),
            restore_store,
            deletion_store,
            restore_cache: RwLock::new(restore_cache),
            deletion_cache: RwLock::new(deletion_cache),
        })
    }

    pub fn vault(&self) -> VaultConfig {
        self.vault.read().expect("vault lock poisoned").clone()
    }

    /// Registers a new key-holder against the live vault configuration.
    /// Callers holding a `requests_dir`-backed vault file are responsible
    /// for re-persisting `vault()` afterwards.
    pub fn register_key_holder(&self, holder: KeyHolder) -> Result<(), ConsentError> {
        self.vault.write().expect("vault lock poisoned").register_key_holder(holder)
    }

    pub fn list_key_holders(&self) -> Vec<KeyHolder> {
        self.vault.read().expect("vault lock poisoned").key_holders.clone()
    }

    fn lookup_key_holder(&self, id: &KeyHolderId) -> Result<String, ConsentError> {
        let vault = self.vault.read().expect("vault lock poisoned");
        vault
            .find_key_holder(id)
            .map(|h| h.public_key.clone())
            .ok_or_else(|| ConsentError::UnknownKeyHolder(id.to_hex()))
    }

    /// Resolves a key-holder's registered display name, falling back to its
    /// hex id only if the registry has somehow lost the entry between the
    /// public-key lookup above and this call (it never should).
    fn key_holder_name(&self, id: &KeyHolderId) -> String {
        self.vault
            .read()
            .expect("vault lock poisoned")
            .find_key_holder(id)
            .map(|h| h.name.clone())
            .unwrap_or_else(|| id.to_hex())
    }

    // ── Restore requests ─────────────────────────────────────────────────

    pub fn create_restore_request(
        &self,
        requester: String,
        snapshot_id: String,
        paths: Vec<String>,
        reason: String,
        now: Timestamp,
    ) -> Result<RestoreRequest, ConsentError> {
        let required = self.vault.read().expect("vault lock poisoned").restore_required_approvals();
        let req = RestoreRequest::create(requester, snapshot_id, paths, reason, required, now);
        self.persist_restore(req)
    }

    pub fn get_restore_request(&self, id: &str) -> Option<RestoreRequest> {
        self.restore_cache.read().expect("restore cache lock poisoned").get(id).cloned()
    }

    pub fn list_restore_requests(&self) -> Vec<RestoreRequest> {
        let mut v: Vec<_> = self
            .restore_cache
            .read()
            .expect("restore cache lock poisoned")
            .values()
            .cloned()
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        v
    }

    pub fn sign_restore_request(
        &self,
        id: &str,
        key_holder_id: KeyHolderId,
        signature: &str,
        now: Timestamp,
    ) -> Result<RestoreRequest, ConsentError> {
        let public_key = self.lookup_key_holder(&key_holder_id)?;
        let name = self.key_holder_name(&key_holder_id);
        let mut req = self
            .restore_cache
            .read()
            .expect("restore cache lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;

        req.sign(key_holder_id, &name, &public_key, signature, now)?;
        let became_approved = req.status == RequestStatus::Approved;
        let result = self.persist_restore(req)?;
        if became_approved {
            tracing::info!(request_id = %result.id, approved_by = %key_holder_id, "restore request reached approval threshold");
        }
        Ok(result)
    }

    pub fn approve_restore_with_share(
        &self,
        id: &str,
        key_holder_id: KeyHolderId,
        index: u8,
        data_hex: String,
        now: Timestamp,
    ) -> Result<RestoreRequest, ConsentError> {
        if self.vault.read().expect("vault lock poisoned").find_key_holder(&key_holder_id).is_none() {
            return Err(ConsentError::UnknownKeyHolder(key_holder_id.to_hex()));
        }
        let mut req = self
            .restore_cache
            .read()
            .expect("restore cache lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;
        req.approve_with_share(key_holder_id, index, data_hex, now)?;
        self.persist_restore(req)
    }

    pub fn deny_restore_request(&self, id: &str, now: Timestamp) -> Result<RestoreRequest, ConsentError> {
        let mut req = self
            .restore_cache
            .read()
            .expect("restore cache lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;
        req.deny(now)?;
        self.persist_restore(req)
    }

    fn persist_restore(&self, req: RestoreRequest) -> Result<RestoreRequest, ConsentError> {
        self.restore_store.save(&req.id, &req)?;
        self.restore_cache
            .write()
            .expect("restore cache lock poisoned")
            .insert(req.id.clone(), req.clone());
        Ok(req)
    }

    // ── Deletion requests ────────────────────────────────────────────────

    pub fn create_deletion_request(
        &self,
        requester: String,
        deletion_type: DeletionType,
        snapshot_ids: Vec<String>,
        paths: Vec<String>,
        reason: String,
        required_approvals: Option<u32>,
        now: Timestamp,
    ) -> Result<DeletionRequest, ConsentError> {
        let req = DeletionRequest::create(requester, deletion_type, snapshot_ids, paths, reason, required_approvals, now);
        self.persist_deletion(req)
    }

    pub fn get_deletion_request(&self, id: &str) -> Option<DeletionRequest> {
        self.deletion_cache.read().expect("deletion cache lock poisoned").get(id).cloned()
    }

    pub fn list_deletion_requests(&self) -> Vec<DeletionRequest> {
        let mut v: Vec<_> = self
            .deletion_cache
            .read()
            .expect("deletion cache lock poisoned")
            .values()
            .cloned()
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        v
    }

    pub fn sign_deletion_request(
        &self,
        id: &str,
        key_holder_id: KeyHolderId,
        signature: &str,
        now: Timestamp,
    ) -> Result<DeletionRequest, ConsentError> {
        let public_key = self.lookup_key_holder(&key_holder_id)?;
        let name = self.key_holder_name(&key_holder_id);
        let mut req = self
            .deletion_cache
            .read()
            .expect("deletion cache lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;
        req.sign(key_holder_id, &name, &public_key, signature, now)?;
        let became_approved = req.status == RequestStatus::Approved;
        let result = self.persist_deletion(req)?;
        if became_approved {
            tracing::info!(request_id = %result.id, approved_by = %key_holder_id, "deletion request reached approval threshold");
        }
        Ok(result)
    }

    pub fn deny_deletion_request(&self, id: &str, now: Timestamp) -> Result<DeletionRequest, ConsentError> {
        let mut req = self
            .deletion_cache
            .read()
            .expect("deletion cache lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;
        req.deny(now)?;
        self.persist_deletion(req)
    }

    /// Called by the storage guard once it has actually performed the
    /// delete (§3 "`executed-at` transitions ... only after `status =
    /// approved`").
    pub fn mark_deletion_executed(&self, id: &str, now: Timestamp) -> Result<DeletionRequest, ConsentError> {
        let mut req = self
            .deletion_cache
            .read()
            .expect("deletion cache lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;
        req.mark_executed(now)?;
        self.persist_deletion(req)
    }

    fn persist_deletion(&self, req: DeletionRequest) -> Result<DeletionRequest, ConsentError> {
        self.deletion_store.save(&req.id, &req)?;
        self.deletion_cache
            .write()
            .expect("deletion cache lock poisoned")
            .insert(req.id.clone(), req.clone());
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::{ConsentMode, KeyHolder};
    use qvault_crypto::signing::sign_restore_request;
    use qvault_crypto::KeyPair;
    use tempfile::TempDir;

    fn test_vault(owner_kp: &KeyPair, holders: &[&KeyPair], k: u8, n: u8) -> VaultConfig {
        let mut vault = VaultConfig::new(
            "alice".into(),
            "repo://x".into(),
            owner_kp.secret_hex(),
            "deadbeef".into(),
            k,
            n,
            true,
            ConsentMode::SignatureConsensus,
        )
        .unwrap();
        vault
            .register_key_holder(KeyHolder::new("alice".into(), owner_kp.public_hex(), None, 1_700_000_000, true).unwrap())
            .unwrap();
        for (i, kp) in holders.iter().enumerate() {
            vault
                .register_key_holder(KeyHolder::new(format!("holder-{i}"), kp.public_hex(), None, 1_700_000_000, false).unwrap())
                .unwrap();
        }
        vault
    }

    #[test]
    fn two_of_three_consensus_approval_flow() {
        let owner = KeyPair::generate();
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let vault = test_vault(&owner, &[&a, &b], 2, 3);

        let dir = TempDir::new().unwrap();
        let manager = ConsentManager::open(vault, dir.path()).unwrap();

        let req = manager
            .create_restore_request("alice".into(), "latest".into(), vec![], "laptop died".into(), 1_700_000_000)
            .unwrap();

        let payload = qvault_crypto::RestoreRequestPayload {
            id: &req.id,
            requester: "alice",
            snapshot_id: "latest",
            reason: "laptop died",
            key_holder_id: &a.key_holder_id.to_hex(),
            paths: &[],
            created_at: req.created_at,
        };
        let sig_a = sign_restore_request(&a, &payload).unwrap();
        let req = manager.sign_restore_request(&req.id, a.key_holder_id, &sig_a, 1_700_000_001).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);

        let payload_b = qvault_crypto::RestoreRequestPayload {
            key_holder_id: &b.key_holder_id.to_hex(),
            ..payload
        };
        let sig_b = sign_restore_request(&b, &payload_b).unwrap();
        let req = manager.sign_restore_request(&req.id, b.key_holder_id, &sig_b, 1_700_000_002).unwrap();
        assert_eq!(req.status, RequestStatus::Approved);

        // Reopening from disk should reflect the persisted approved state.
        let vault2 = manager.vault();
        drop(manager);
        let manager2 = ConsentManager::open(vault2, dir.path()).unwrap();
        let reloaded = manager2.get_restore_request(&req.id).unwrap();
        assert_eq!(reloaded.status, RequestStatus::Approved);
    }

    #[test]
    fn register_key_holder_is_visible_immediately() {
        let owner = KeyPair::generate();
        let vault = test_vault(&owner, &[], 1, 2);
        let dir = TempDir::new().unwrap();
        let manager = ConsentManager::open(vault, dir.path()).unwrap();
        assert_eq!(manager.list_key_holders().len(), 1);

        let newcomer = KeyPair::generate();
        let holder = KeyHolder::new("dave".into(), newcomer.public_hex(), None, 1_700_000_100, false).unwrap();
        manager.register_key_holder(holder).unwrap();

        assert_eq!(manager.list_key_holders().len(), 2);
        assert!(manager.vault().find_key_holder(&newcomer.key_holder_id).is_some());
    }

    #[test]
    fn unknown_key_holder_rejected() {
        let owner = KeyPair::generate();
        let vault = test_vault(&owner, &[], 1, 1);
        let dir = TempDir::new().unwrap();
        let manager = ConsentManager::open(vault, dir.path()).unwrap();
        let req = manager
            .create_restore_request("alice".into(), "latest".into(), vec![], "r".into(), 1_700_000_000)
            .unwrap();

        let stranger = KeyPair::generate();
        let result = manager.sign_restore_request(&req.id, stranger.key_holder_id, "00", 1_700_000_001);
        assert!(matches!(result, Err(ConsentError::UnknownKeyHolder(_))));
    }
}
