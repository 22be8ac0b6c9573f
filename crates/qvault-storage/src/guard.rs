//! The storage guard (C9): the single write path a storage host exposes
//! for vault blobs. Every accepted mutation produces exactly one audit
//! entry; every rejected one leaves no entry and increments a counter.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use qvault_audit::Chain;
use qvault_consensus::{ConsentManager, RequestStatus};
use qvault_policy::{DeletionMode, Policy};
use qvault_tickets::{DeletionTicket, Ledger, TicketTarget};
use qvault_core::Timestamp;

use crate::error::StorageError;
use crate::layout::{self, scan_used_bytes, BlobPath};

/// Outcome of an accepted `put`. `created = false` means the identical
/// bytes were already on disk at that path (idempotent no-op write).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub created: bool,
}

/// Proof presented alongside a delete request. What is required depends
/// on the active policy's [`DeletionMode`].
#[derive(Debug, Clone)]
pub enum DeleteAuthorization {
    /// `time-lock-only`: no extra proof, the guard checks elapsed retention.
    None,
    /// `owner-only`: id of a registered, owner-signed deletion ticket.
    Ticket { ticket_id: String },
    /// `both-required`: a ticket plus the id of a deletion request the
    /// consent manager has already recorded as `Approved`.
    TicketAndRequest { ticket_id: String, request_id: String },
}

pub struct StorageGuard {
    base: PathBuf,
    quota_bytes: u64,
    used_bytes: AtomicU64,
    rejections: AtomicU64,
    policy: RwLock<Option<Policy>>,
    tickets: RwLock<Ledger>,
    audit: Arc<Chain>,
    consent: Option<Arc<ConsentManager>>,
}

impl StorageGuard {
    /// Opens (creating if absent) the repo layout rooted at `base` and
    /// revalidates the quota counter by scanning bytes already on disk.
    pub fn open(
        base: PathBuf,
        quota_bytes: u64,
        audit: Arc<Chain>,
        consent: Option<Arc<ConsentManager>>,
    ) -> Result<Self, StorageError> {
        for sub in ["data", "keys", "snapshots", "index"] {
            std::fs::create_dir_all(base.join(sub))?;
        }
        let used_bytes = scan_used_bytes(&base)?;
        Ok(Self {
            base,
            quota_bytes,
            used_bytes: AtomicU64::new(used_bytes),
            rejections: AtomicU64::new(0),
            policy: RwLock::new(None),
            tickets: RwLock::new(Ledger::new()),
            audit,
            consent,
        })
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::SeqCst)
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::SeqCst)
    }

    pub fn set_policy(&self, policy: Policy) {
        *self.policy.write().expect("policy lock poisoned") = Some(policy);
    }

    pub fn policy(&self) -> Option<Policy> {
        self.policy.read().expect("policy lock poisoned").clone()
    }

    /// Registers an owner-issued deletion ticket so a later `delete` can
    /// redeem it. Fails if the ticket's signature does not verify.
    pub fn register_ticket(
        &self,
        ticket: DeletionTicket,
        issuer_public_key_hex: &str,
    ) -> Result<(), StorageError> {
        self.tickets
            .write()
            .expect("ticket lock poisoned")
            .register(ticket, issuer_public_key_hex)?;
        Ok(())
    }

    fn reject(&self) {
        self.rejections.fetch_add(1, Ordering::SeqCst);
    }

    /// Writes `contents` at `path`. Idempotent: writing the same bytes to
    /// the same path twice succeeds both times with a single stored blob.
    /// Writing different bytes to an existing path is an append-only
    /// violation.
    pub fn put(
        &self,
        raw_path: &str,
        contents: &[u8],
        actor_key_id: &str,
        now: Timestamp,
    ) -> Result<PutOutcome, StorageError> {
        let path = match BlobPath::parse(raw_path) {
            Ok(p) => p,
            Err(e) => {
                self.reject();
                return Err(e);
            }
        };
        if let Err(e) = layout::verify_content_address(&path, contents) {
            self.reject();
            return Err(e);
        }

        let fs_path = path.to_fs_path(&self.base);
        let outcome = if fs_path.exists() {
            let existing = std::fs::read(&fs_path)?;
            if existing == contents {
                PutOutcome { created: false }
            } else {
                self.reject();
                return Err(StorageError::AppendOnlyViolation(path.relative.clone()));
            }
        } else {
            let incoming = contents.len() as u64;
            let used = self.used_bytes();
            if used + incoming > self.quota_bytes {
                self.reject();
                return Err(StorageError::QuotaExceeded {
                    used,
                    incoming,
                    quota: self.quota_bytes,
                });
            }
            if let Some(parent) = fs_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let tmp_path = fs_path.with_extension("tmp");
            std::fs::write(&tmp_path, contents)?;
            std::fs::rename(&tmp_path, &fs_path)?;
            self.used_bytes.fetch_add(incoming, Ordering::SeqCst);
            PutOutcome { created: true }
        };

        self.audit.append("put", &path.relative, actor_key_id, now)?;
        Ok(outcome)
    }

    pub fn get(&self, raw_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = BlobPath::parse(raw_path)?;
        let fs_path = path.to_fs_path(&self.base);
        std::fs::read(&fs_path).map_err(|_| StorageError::NotFound {
            path: path.relative.clone(),
        })
    }

    /// Returns the blob's size without reading its contents.
    pub fn head(&self, raw_path: &str) -> Result<u64, StorageError> {
        let path = BlobPath::parse(raw_path)?;
        let fs_path = path.to_fs_path(&self.base);
        std::fs::metadata(&fs_path)
            .map(|m| m.len())
            .map_err(|_| StorageError::NotFound {
                path: path.relative.clone(),
            })
    }

    /// Lists blob paths under `prefix` (e.g. `"data"`), sorted.
    pub fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let root = if prefix.is_empty() {
            self.base.clone()
        } else {
            BlobPath::parse(prefix)?.to_fs_path(&self.base)
        };
        let mut out = Vec::new();
        if root.exists() {
            let mut stack = vec![root.clone()];
            while let Some(dir) = stack.pop() {
                for entry in std::fs::read_dir(&dir)? {
                    let entry = entry?;
                    let meta = entry.metadata()?;
                    if meta.is_dir() {
                        stack.push(entry.path());
                    } else if meta.is_file() {
                        let rel = entry
                            .path()
                            .strip_prefix(&self.base)
                            .unwrap_or(&entry.path())
                            .to_string_lossy()
                            .replace('\\', "/");
                        out.push(rel);
                    }
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Deletes `path` if the active policy's deletion mode and the supplied
    /// `auth` permit it. See module docs for the per-mode authorization
    /// rule.
    pub fn delete(
        &self,
        raw_path: &str,
        auth: DeleteAuthorization,
        actor_key_id: &str,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let path = match BlobPath::parse(raw_path) {
            Ok(p) => p,
            Err(e) => {
                self.reject();
                return Err(e);
            }
        };
        let fs_path = path.to_fs_path(&self.base);
        let meta = match std::fs::metadata(&fs_path) {
            Ok(m) => m,
            Err(_) => {
                self.reject();
                return Err(StorageError::NotFound {
                    path: path.relative.clone(),
                });
            }
        };

        if let Err(e) = self.authorize_delete(&path, &meta, auth, now) {
            self.reject();
            return Err(e);
        }

        let size = meta.len();
        std::fs::remove_file(&fs_path)?;
        self.used_bytes.fetch_sub(size, Ordering::SeqCst);
        self.audit.append("delete", &path.relative, actor_key_id, now)?;
        Ok(())
    }

    fn authorize_delete(
        &self,
        path: &BlobPath,
        meta: &std::fs::Metadata,
        auth: DeleteAuthorization,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        let policy = self.policy().ok_or(StorageError::NoActivePolicy)?;
        match policy.deletion_mode {
            DeletionMode::Never => Err(StorageError::DeletionDisallowed),
            DeletionMode::TimeLockOnly => {
                let written_at = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(now);
                let elapsed = now - written_at;
                let retention_secs = policy.retention_days as i64 * 86_400;
                if elapsed >= retention_secs {
                    Ok(())
                } else {
                    Err(StorageError::DeletionDisallowed)
                }
            }
            DeletionMode::OwnerOnly => match auth {
                DeleteAuthorization::Ticket { ticket_id } => {
                    self.redeem_ticket(&ticket_id, path, meta, now)
                }
                _ => Err(StorageError::BadDeletionAuthorization(
                    "owner-only deletion requires a deletion ticket".into(),
                )),
            },
            DeletionMode::BothRequired => match auth {
                DeleteAuthorization::TicketAndRequest {
                    ticket_id,
                    request_id,
                } => {
                    self.redeem_ticket(&ticket_id, path, meta, now)?;
                    self.require_approved_request(&request_id, now)?;
                    Ok(())
                }
                _ => Err(StorageError::BadDeletionAuthorization(
                    "both-required deletion needs a ticket and an approved deletion request"
                        .into(),
                )),
            },
        }
    }

    /// Redeems `ticket_id` against `path`, rejecting the redemption outright
    /// if the ticket's target does not cover this path — a ticket scoped to
    /// one snapshot or path must never authorise deleting another.
    fn redeem_ticket(
        &self,
        ticket_id: &str,
        path: &BlobPath,
        meta: &std::fs::Metadata,
        now: Timestamp,
    ) -> Result<(), StorageError> {
        {
            let tickets = self.tickets.read().expect("ticket lock poisoned");
            let ticket = tickets.get(ticket_id).ok_or_else(|| {
                StorageError::BadDeletionAuthorization(format!("unknown ticket {ticket_id}"))
            })?;
            if !target_covers_path(&ticket.target, path, meta, now) {
                return Err(StorageError::BadDeletionAuthorization(format!(
                    "ticket {ticket_id} does not authorize deleting {}",
                    path.relative
                )));
            }
        }
        self.tickets
            .write()
            .expect("ticket lock poisoned")
            .redeem(ticket_id, now)?;
        Ok(())
    }

    fn require_approved_request(&self, request_id: &str, now: Timestamp) -> Result<(), StorageError> {
        let consent = self.consent.as_ref().ok_or_else(|| {
            StorageError::BadDeletionAuthorization(
                "no consent manager wired to check deletion request approval".into(),
            )
        })?;
        let request = consent.get_deletion_request(request_id).ok_or_else(|| {
            StorageError::BadDeletionAuthorization(format!("unknown deletion request {request_id}"))
        })?;
        if request.status != RequestStatus::Approved {
            return Err(StorageError::BadDeletionAuthorization(format!(
                "deletion request {request_id} is not approved"
            )));
        }
        consent.mark_deletion_executed(request_id, now)?;
        Ok(())
    }
}

/// True if `target` scopes the redeeming ticket to cover `path`. A snapshot
/// ticket only covers that snapshot's own entry under `snapshots/`; a path
/// ticket only covers an exact path match; a prune ticket covers any blob
/// last written at or before its cutoff, regardless of path.
fn target_covers_path(
    target: &TicketTarget,
    path: &BlobPath,
    meta: &std::fs::Metadata,
    now: Timestamp,
) -> bool {
    match target {
        TicketTarget::Snapshot { snapshot_id } => path.relative == layout::snapshot_path(snapshot_id),
        TicketTarget::Path { path: target_path } => {
            path.relative == target_path.trim_start_matches('/')
        }
        TicketTarget::Prune { prune_cutoff } => {
            let written_at = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(now);
            written_at <= *prune_cutoff
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvault_audit::Chain;
    use qvault_crypto::hash::sha256_hex;

    fn open_guard(dir: &std::path::Path, quota: u64) -> StorageGuard {
        let audit = Arc::new(Chain::open(dir.join("audit.log")).unwrap());
        StorageGuard::open(dir.join("repo"), quota, audit, None).unwrap()
    }

    #[test]
    fn idempotent_put_is_a_single_blob() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(dir.path(), 1_000_000);
        let body = b"hello world".to_vec();
        let sha = sha256_hex(&body);
        let path = layout::data_blob_path(&sha);

        let first = guard.put(&path, &body, "k1", 1).unwrap();
        assert!(first.created);
        let second = guard.put(&path, &body, "k1", 2).unwrap();
        assert!(!second.created);
        assert_eq!(guard.list("data").unwrap().len(), 1);
    }

    #[test]
    fn overwrite_with_different_bytes_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(dir.path(), 1_000_000);
        let body = b"hello world".to_vec();
        let sha = sha256_hex(&body);
        let path = layout::data_blob_path(&sha);

        guard.put(&path, &body, "k1", 1).unwrap();
        let other_path = format!("data/{}/{}", &sha[..2], sha);
        let err = guard.put(&other_path, b"different bytes", "k1", 2).unwrap_err();
        assert!(matches!(err, StorageError::HashMismatch { .. }));
    }

    #[test]
    fn quota_exceeded_rejects_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(dir.path(), 4);
        let body = b"too big".to_vec();
        let sha = sha256_hex(&body);
        let path = layout::data_blob_path(&sha);
        let err = guard.put(&path, &body, "k1", 1).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(guard.rejections(), 1);
    }

    fn owner_only_policy(owner_kp: &qvault_crypto::keypair::KeyPair, host_kp: &qvault_crypto::keypair::KeyPair) -> Policy {
        let owner = qvault_policy::Identity {
            name: "alice".into(),
            key_id: owner_kp.key_holder_id.to_hex(),
            public_key: owner_kp.public_hex(),
        };
        let host = qvault_policy::Identity {
            name: "host".into(),
            key_id: host_kp.key_holder_id.to_hex(),
            public_key: host_kp.public_hex(),
        };
        let mut policy = Policy::new(owner, host, 30, DeletionMode::OwnerOnly, 1_000_000, 1_700_000_000, None);
        policy.sign_as_owner(owner_kp).unwrap();
        policy.sign_as_host(host_kp).unwrap();
        policy
    }

    #[test]
    fn ticket_scoped_to_one_path_does_not_authorize_another() {
        use qvault_crypto::keypair::KeyPair;
        use qvault_tickets::DeletionTicket;

        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(dir.path(), 1_000_000);
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();
        guard.set_policy(owner_only_policy(&owner_kp, &host_kp));

        let body_a = b"blob a".to_vec();
        let sha_a = sha256_hex(&body_a);
        let path_a = layout::data_blob_path(&sha_a);
        let body_b = b"blob b".to_vec();
        let sha_b = sha256_hex(&body_b);
        let path_b = layout::data_blob_path(&sha_b);
        guard.put(&path_a, &body_a, "k1", 1).unwrap();
        guard.put(&path_b, &body_b, "k1", 1).unwrap();

        let mut ticket = DeletionTicket::new(
            "t1".into(),
            qvault_tickets::TicketTarget::Path { path: path_a.clone() },
            "cleanup".into(),
            1_700_000_000,
            1_700_100_000,
            owner_kp.key_holder_id.to_hex(),
        );
        ticket.sign(&owner_kp).unwrap();
        guard.register_ticket(ticket, &owner_kp.public_hex()).unwrap();

        let err = guard
            .delete(&path_b, DeleteAuthorization::Ticket { ticket_id: "t1".into() }, "k1", 2)
            .unwrap_err();
        assert!(matches!(err, StorageError::BadDeletionAuthorization(_)));

        guard
            .delete(&path_a, DeleteAuthorization::Ticket { ticket_id: "t1".into() }, "k1", 2)
            .unwrap();
    }

    #[test]
    fn delete_without_policy_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(dir.path(), 1_000_000);
        let body = b"x".to_vec();
        let sha = sha256_hex(&body);
        let path = layout::data_blob_path(&sha);
        guard.put(&path, &body, "k1", 1).unwrap();
        let err = guard
            .delete(&path, DeleteAuthorization::None, "k1", 2)
            .unwrap_err();
        assert!(matches!(err, StorageError::NoActivePolicy));
    }
}
