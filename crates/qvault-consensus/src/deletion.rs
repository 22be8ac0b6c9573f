//! Deletion-request lifecycle (§3, §4.4): identical consent structure to
//! `RestoreRequest`, plus an `executed` terminal transition the storage
//! guard stamps once it has actually performed the delete.

use serde::{Deserialize, Serialize};

use qvault_core::constants::{DELETION_DEFAULT_REQUIRED_APPROVALS, REQUEST_DEFAULT_EXPIRY_SECS};
use qvault_core::types::{KeyHolderId, Timestamp};
use qvault_crypto::signing::{verify_deletion_request, DeletionRequestPayload};

use crate::error::ConsentError;
use crate::request::{generate_request_id, Approval, RequestStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionType {
    Snapshot,
    Path,
    Prune,
    All,
}

impl DeletionType {
    fn as_str(self) -> &'static str {
        match self {
            DeletionType::Snapshot => "snapshot",
            DeletionType::Path => "path",
            DeletionType::Prune => "prune",
            DeletionType::All => "all",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub id: String,
    pub requester: String,
    pub deletion_type: DeletionType,
    pub snapshot_ids: Vec<String>,
    pub paths: Vec<String>,
    pub reason: String,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub required_approvals: u32,
    pub approvals: Vec<Approval>,
    #[serde(default)]
    pub approved_at: Option<Timestamp>,
    #[serde(default)]
    pub approved_by: Option<KeyHolderId>,
    #[serde(default)]
    pub executed_at: Option<Timestamp>,
}

impl DeletionRequest {
    pub fn create(
        requester: String,
        deletion_type: DeletionType,
        snapshot_ids: Vec<String>,
        paths: Vec<String>,
        reason: String,
        required_approvals: Option<u32>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: generate_request_id(),
            requester,
            deletion_type,
            snapshot_ids,
            paths,
            reason,
            status: RequestStatus::Pending,
            created_at,
            expires_at: created_at + REQUEST_DEFAULT_EXPIRY_SECS,
            required_approvals: required_approvals.unwrap_or(DELETION_DEFAULT_REQUIRED_APPROVALS),
            approvals: Vec::new(),
            approved_at: None,
            approved_by: None,
            executed_at: None,
        }
    }

    fn payload(&self, key_holder_id: &str) -> DeletionRequestPayload<'_> {
        DeletionRequestPayload {
            id: &self.id,
            requester: &self.requester,
            deletion_type: self.deletion_type.as_str(),
            snapshot_ids: &self.snapshot_ids,
            paths: &self.paths,
            reason: &self.reason,
            key_holder_id,
            created_at: self.created_at,
        }
    }

    pub fn refresh_expiry(&mut self, now: Timestamp) {
        if self.status == RequestStatus::Pending && now > self.expires_at {
            self.status = RequestStatus::Expired;
        }
    }

    pub fn sign(
        &mut self,
        key_holder_id: KeyHolderId,
        name: &str,
        public_key_hex: &str,
        signature: &str,
        now: Timestamp,
    ) -> Result<(), ConsentError> {
        self.refresh_expiry(now);
        if self.status != RequestStatus::Pending {
            return Err(ConsentError::BadState(self.id.clone()));
        }
        if self.approvals.iter().any(|a| a.key_holder_id == key_holder_id) {
            return Err(ConsentError::AlreadySigned(key_holder_id.to_hex()));
        }

        let payload = self.payload(&key_holder_id.to_hex());
        verify_deletion_request(public_key_hex, &payload, signature)
            .map_err(|_| ConsentError::BadSignature(key_holder_id.to_hex()))?;

        self.approvals.push(Approval {
            key_holder_id,
            name: name.to_string(),
            signature: signature.to_string(),
            at: now,
        });

        if self.approvals.len() as u32 >= self.required_approvals {
            self.status = RequestStatus::Approved;
            self.approved_at = Some(now);
            self.approved_by = Some(key_holder_id);
        }
        Ok(())
    }

    pub fn deny(&mut self, now: Timestamp) -> Result<(), ConsentError> {
        self.refresh_expiry(now);
        if self.status != RequestStatus::Pending {
            return Err(ConsentError::BadState(self.id.clone()));
        }
        self.status = RequestStatus::Denied;
        Ok(())
    }

    /// Stamps `executed_at` once the storage guard reports the delete
    /// happened (§3 "`executed-at` transitions from null to a timestamp
    /// exactly once, only after `status = approved`").
    pub fn mark_executed(&mut self, now: Timestamp) -> Result<(), ConsentError> {
        if self.status != RequestStatus::Approved {
            return Err(ConsentError::BadState(self.id.clone()));
        }
        if self.executed_at.is_some() {
            return Err(ConsentError::BadState(self.id.clone()));
        }
        self.executed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvault_crypto::signing::sign_deletion_request;
    use qvault_crypto::KeyPair;

    fn sign_for(req: &DeletionRequest, kp: &KeyPair) -> String {
        let payload = req.payload(&kp.key_holder_id.to_hex());
        sign_deletion_request(kp, &payload).unwrap()
    }

    #[test]
    fn default_required_approvals_is_two() {
        let req = DeletionRequest::create(
            "alice".into(),
            DeletionType::Snapshot,
            vec!["snap-1".into()],
            vec![],
            "cleanup".into(),
            None,
            1_700_000_000,
        );
        assert_eq!(req.required_approvals, 2);
    }

    #[test]
    fn executes_only_after_approval_and_exactly_once() {
        let mut req = DeletionRequest::create(
            "alice".into(),
            DeletionType::Snapshot,
            vec!["snap-1".into()],
            vec![],
            "cleanup".into(),
            Some(1),
            1_700_000_000,
        );
        assert!(req.mark_executed(1_700_000_001).is_err());

        let kp = KeyPair::generate();
        let sig = sign_for(&req, &kp);
        req.sign(kp.key_holder_id, "holder", &kp.public_hex(), &sig, 1_700_000_002).unwrap();
        assert_eq!(req.status, RequestStatus::Approved);

        req.mark_executed(1_700_000_003).unwrap();
        assert_eq!(req.executed_at, Some(1_700_000_003));
        assert!(req.mark_executed(1_700_000_004).is_err());
    }
}
