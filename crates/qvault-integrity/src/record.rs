//! Owner-signed `VerificationRecord` (§3, §4.6): binds a snapshot to a
//! deterministic hash summary so silent corruption at the host can be
//! detected later without trusting the host's own word for it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use qvault_core::types::Timestamp;
use qvault_crypto::keypair::KeyPair;
use qvault_crypto::signing::{sign_verification_record, verify_verification_record, VerificationRecordPayload};

use crate::check::{config_path, hash_file, list_data_blobs, list_key_hashes, snapshot_path};
use crate::error::IntegrityError;
use crate::merkle::merkle_root;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: String,
    pub snapshot_id: String,
    pub created_at: Timestamp,
    pub owner_key_id: String,
    pub config_hash: String,
    pub key_hashes: Vec<String>,
    pub snapshot_hash: String,
    pub data_merkle_root: String,
    pub data_file_count: u64,
    #[serde(default)]
    pub owner_signature: Option<String>,
}

impl VerificationRecord {
    fn payload(&self) -> VerificationRecordPayload<'_> {
        VerificationRecordPayload {
            id: &self.id,
            snapshot_id: &self.snapshot_id,
            created_at: self.created_at,
            owner_key_id: &self.owner_key_id,
            config_hash: &self.config_hash,
            key_hashes: &self.key_hashes,
            snapshot_hash: &self.snapshot_hash,
            data_merkle_root: &self.data_merkle_root,
            data_file_count: self.data_file_count,
        }
    }

    pub fn sign(&mut self, kp: &KeyPair) -> Result<(), IntegrityError> {
        let sig = sign_verification_record(kp, &self.payload())?;
        self.owner_signature = Some(sig);
        Ok(())
    }

    pub fn verify_signature(&self, owner_public_key_hex: &str) -> Result<(), IntegrityError> {
        let sig = self.owner_signature.as_deref().ok_or(IntegrityError::UnsignedRecord)?;
        verify_verification_record(owner_public_key_hex, &self.payload(), sig)
            .map_err(|_| IntegrityError::BadSignature)
    }
}

/// Builds and signs a fresh `VerificationRecord` for `snapshot_id` in
/// `repo`: hashes the config file and the snapshot file, collects the
/// sorted key-file names, computes the data-blob merkle root and count,
/// then signs the result under `owner_kp` (§4.6 `create_verification_record`).
pub fn create_verification_record(
    repo: &Path,
    snapshot_id: &str,
    id: String,
    created_at: Timestamp,
    owner_kp: &KeyPair,
) -> Result<VerificationRecord, IntegrityError> {
    let config_hash = hash_file(&config_path(repo))?;
    let snapshot_hash = hash_file(&snapshot_path(repo, snapshot_id))?;
    let key_hashes = list_key_hashes(repo)?;

    let blob_names: Vec<String> = list_data_blobs(repo)?
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(|s| s.to_string()))
        .collect();
    let data_file_count = blob_names.len() as u64;
    let data_merkle_root = merkle_root(&blob_names);

    let mut record = VerificationRecord {
        id,
        snapshot_id: snapshot_id.to_string(),
        created_at,
        owner_key_id: owner_kp.key_holder_id.to_hex(),
        config_hash,
        key_hashes,
        snapshot_hash,
        data_merkle_root,
        data_file_count,
        owner_signature: None,
    };
    record.sign(owner_kp)?;
    Ok(record)
}

/// Recomputes the repository's current hash summary and compares it
/// against a previously accepted `record` (§4.6 `verify_against_record`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifyAgainstReport {
    pub matches: bool,
    pub errors: Vec<String>,
}

pub fn verify_against_record(repo: &Path, record: &VerificationRecord) -> Result<VerifyAgainstReport, IntegrityError> {
    let mut errors = Vec::new();

    match hash_file(&config_path(repo)) {
        Ok(h) if h != record.config_hash => errors.push(format!(
            "config hash mismatch: expected {}, got {h}",
            record.config_hash
        )),
        Ok(_) => {}
        Err(e) => errors.push(format!("config unreadable: {e}")),
    }

    match hash_file(&snapshot_path(repo, &record.snapshot_id)) {
        Ok(h) if h != record.snapshot_hash => errors.push(format!(
            "snapshot hash mismatch: expected {}, got {h}",
            record.snapshot_hash
        )),
        Ok(_) => {}
        Err(e) => errors.push(format!("snapshot unreadable: {e}")),
    }

    let key_hashes = list_key_hashes(repo)?;
    if key_hashes != record.key_hashes {
        errors.push("key file set differs from the recorded set".to_string());
    }

    let blob_names: Vec<String> = list_data_blobs(repo)?
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(|s| s.to_string()))
        .collect();
    if blob_names.len() as u64 != record.data_file_count {
        errors.push(format!(
            "data file count mismatch: expected {}, got {}",
            record.data_file_count,
            blob_names.len()
        ));
    }
    let root = merkle_root(&blob_names);
    if root != record.data_merkle_root {
        errors.push(format!(
            "data merkle root mismatch: expected {}, got {root}",
            record.data_merkle_root
        ));
    }

    Ok(VerifyAgainstReport {
        matches: errors.is_empty(),
        errors,
    })
}

/// In-memory index of accepted verification records, one per snapshot id
/// (§3 invariant: "one record per snapshot-id").
#[derive(Default)]
pub struct RecordStore {
    by_snapshot: HashMap<String, VerificationRecord>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies the record's signature and indexes it. Rejects an unsigned
    /// record, a bad signature, or a duplicate snapshot id (§4.6
    /// `add_verification_record`).
    pub fn add(&mut self, record: VerificationRecord, owner_public_key_hex: &str) -> Result<(), IntegrityError> {
        if self.by_snapshot.contains_key(&record.snapshot_id) {
            return Err(IntegrityError::DuplicateSnapshot(record.snapshot_id));
        }
        record.verify_signature(owner_public_key_hex)?;
        self.by_snapshot.insert(record.snapshot_id.clone(), record);
        Ok(())
    }

    pub fn get(&self, snapshot_id: &str) -> Option<&VerificationRecord> {
        self.by_snapshot.get(snapshot_id)
    }

    pub fn len(&self) -> usize {
        self.by_snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_snapshot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_repo(dir: &Path, snapshot_id: &str) {
        fs::write(dir.join("config"), b"config contents").unwrap();
        fs::create_dir_all(dir.join("snapshots")).unwrap();
        fs::write(dir.join("snapshots").join(snapshot_id), b"snapshot contents").unwrap();
        fs::create_dir_all(dir.join("keys")).unwrap();
        fs::write(dir.join("keys").join("deadbeef"), b"key").unwrap();
        let hash = qvault_crypto::hash::sha256_hex(b"blob contents");
        let blob_dir = dir.join("data").join(&hash[..2]);
        fs::create_dir_all(&blob_dir).unwrap();
        fs::write(blob_dir.join(&hash), b"blob contents").unwrap();
    }

    #[test]
    fn create_and_add_then_verify_matches() {
        let dir = TempDir::new().unwrap();
        write_repo(dir.path(), "snap-1");
        let owner_kp = KeyPair::generate();

        let record = create_verification_record(dir.path(), "snap-1", "rec-1".into(), 1_700_000_000, &owner_kp).unwrap();

        let mut store = RecordStore::new();
        store.add(record.clone(), &owner_kp.public_hex()).unwrap();
        assert_eq!(store.len(), 1);

        let report = verify_against_record(dir.path(), &record).unwrap();
        assert!(report.matches, "{:?}", report.errors);
    }

    #[test]
    fn tampered_blob_fails_verify_against_record() {
        let dir = TempDir::new().unwrap();
        write_repo(dir.path(), "snap-1");
        let owner_kp = KeyPair::generate();
        let record = create_verification_record(dir.path(), "snap-1", "rec-1".into(), 1_700_000_000, &owner_kp).unwrap();

        // Add a new, unrecorded blob.
        let blob_dir = dir.path().join("data").join("ff");
        fs::create_dir_all(&blob_dir).unwrap();
        fs::write(blob_dir.join("ffffffff"), b"new blob").unwrap();

        let report = verify_against_record(dir.path(), &record).unwrap();
        assert!(!report.matches);
    }

    #[test]
    fn duplicate_snapshot_rejected() {
        let dir = TempDir::new().unwrap();
        write_repo(dir.path(), "snap-1");
        let owner_kp = KeyPair::generate();
        let record = create_verification_record(dir.path(), "snap-1", "rec-1".into(), 1_700_000_000, &owner_kp).unwrap();

        let mut store = RecordStore::new();
        store.add(record.clone(), &owner_kp.public_hex()).unwrap();
        assert!(matches!(
            store.add(record, &owner_kp.public_hex()),
            Err(IntegrityError::DuplicateSnapshot(_))
        ));
    }

    #[test]
    fn unsigned_record_rejected() {
        let record = VerificationRecord {
            id: "rec-1".into(),
            snapshot_id: "snap-1".into(),
            created_at: 1_700_000_000,
            owner_key_id: "deadbeefdeadbeef".into(),
            config_hash: "a".repeat(64),
            key_hashes: vec![],
            snapshot_hash: "b".repeat(64),
            data_merkle_root: "c".repeat(64),
            data_file_count: 0,
            owner_signature: None,
        };
        let mut store = RecordStore::new();
        let owner_kp = KeyPair::generate();
        assert!(matches!(
            store.add(record, &owner_kp.public_hex()),
            Err(IntegrityError::UnsignedRecord)
        ));
    }
}
