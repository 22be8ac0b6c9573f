//! Restore-request lifecycle (§3, §4.4): `pending → approved | denied |
//! expired`, signature aggregation to a configurable threshold.

use serde::{Deserialize, Serialize};

use qvault_core::constants::REQUEST_DEFAULT_EXPIRY_SECS;
use qvault_core::types::{KeyHolderId, Timestamp};
use qvault_crypto::signing::{verify_restore_request, RestoreRequestPayload};

use crate::error::ConsentError;
use crate::request::{generate_request_id, Approval, ReleasedShare, RequestStatus};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub id: String,
    pub requester: String,
    pub snapshot_id: String,
    pub paths: Vec<String>,
    pub reason: String,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub required_approvals: u32,
    pub approvals: Vec<Approval>,
    #[serde(default)]
    pub released_shares: Vec<ReleasedShare>,
    #[serde(default)]
    pub approved_at: Option<Timestamp>,
    #[serde(default)]
    pub approved_by: Option<KeyHolderId>,
}

impl RestoreRequest {
    pub fn create(
        requester: String,
        snapshot_id: String,
        paths: Vec<String>,
        reason: String,
        required_approvals: u32,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: generate_request_id(),
            requester,
            snapshot_id,
            paths,
            reason,
            status: RequestStatus::Pending,
            created_at,
            expires_at: created_at + REQUEST_DEFAULT_EXPIRY_SECS,
            required_approvals,
            approvals: Vec::new(),
            released_shares: Vec::new(),
            approved_at: None,
            approved_by: None,
        }
    }

    fn payload(&self, key_holder_id: &str) -> RestoreRequestPayload<'_> {
        RestoreRequestPayload {
            id: &self.id,
            requester: &self.requester,
            snapshot_id: &self.snapshot_id,
            reason: &self.reason,
            key_holder_id,
            paths: &self.paths,
            created_at: self.created_at,
        }
    }

    /// Lazily transitions `pending → expired` if the expiry has passed.
    /// Called before every state-changing operation (§4.4 "rejects if
    /// status ≠ pending or now > expires_at (transition to expired
    /// first)").
    pub fn refresh_expiry(&mut self, now: Timestamp) {
        if self.status == RequestStatus::Pending && now > self.expires_at {
            self.status = RequestStatus::Expired;
        }
    }

    /// Records a signature-consensus approval from `key_holder_id`, whose
    /// registered public key is `public_key_hex`. Verifies the signature
    /// over the canonical restore-request payload (§6), rejects a
    /// duplicate signer, and promotes the request to `approved` the moment
    /// the threshold is crossed — never before, never after.
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
        verify_restore_request(public_key_hex, &payload, signature)
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

    /// Legacy 2-of-2 path: attaches a released raw Shamir share instead of
    /// a signature (§4.4 "approve(id, holder, share_data)"). Threshold
    /// evaluation is identical.
    pub fn approve_with_share(
        &mut self,
        key_holder_id: KeyHolderId,
        index: u8,
        data_hex: String,
        now: Timestamp,
    ) -> Result<(), ConsentError> {
        self.refresh_expiry(now);
        if self.status != RequestStatus::Pending {
            return Err(ConsentError::BadState(self.id.clone()));
        }
        if self.released_shares.iter().any(|s| s.key_holder_id == key_holder_id) {
            return Err(ConsentError::AlreadySigned(key_holder_id.to_hex()));
        }
        self.released_shares.push(ReleasedShare {
            key_holder_id,
            index,
            data_hex,
            at: now,
        });
        if self.released_shares.len() as u32 >= self.required_approvals {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use qvault_crypto::signing::sign_restore_request;
    use qvault_crypto::KeyPair;

    fn sign_for(req: &RestoreRequest, kp: &KeyPair) -> String {
        let payload = req.payload(&kp.key_holder_id.to_hex());
        sign_restore_request(kp, &payload).unwrap()
    }

    #[test]
    fn approves_at_exactly_the_kth_signature() {
        let mut req = RestoreRequest::create(
            "alice".into(),
            "latest".into(),
            vec![],
            "laptop died".into(),
            2,
            1_700_000_000,
        );
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let c = KeyPair::generate();

        let sig_a = sign_for(&req, &a);
        req.sign(a.key_holder_id, "a", &a.public_hex(), &sig_a, 1_700_000_001).unwrap();
        assert_eq!(req.status, RequestStatus::Pending);

        let sig_b = sign_for(&req, &b);
        req.sign(b.key_holder_id, "b", &b.public_hex(), &sig_b, 1_700_000_002).unwrap();
        assert_eq!(req.status, RequestStatus::Approved);
        assert_eq!(req.approved_at, Some(1_700_000_002));
        assert_eq!(req.approved_by, Some(b.key_holder_id));

        let sig_c = sign_for(&req, &c);
        let result = req.sign(c.key_holder_id, "c", &c.public_hex(), &sig_c, 1_700_000_003);
        assert!(result.is_err());
        assert_eq!(req.status, RequestStatus::Approved);
    }

    #[test]
    fn tampered_request_signature_rejected() {
        let mut req = RestoreRequest::create(
            "alice".into(),
            "latest".into(),
            vec![],
            "laptop died".into(),
            1,
            1_700_000_000,
        );
        let a = KeyPair::generate();
        let sig = sign_for(&req, &a);
        req.reason = "steal data".to_string();
        let result = req.sign(a.key_holder_id, "a", &a.public_hex(), &sig, 1_700_000_001);
        assert!(matches!(result, Err(ConsentError::BadSignature(_))));
    }

    #[test]
    fn duplicate_signer_rejected() {
        let mut req = RestoreRequest::create(
            "alice".into(),
            "latest".into(),
            vec![],
            "reason".into(),
            2,
            1_700_000_000,
        );
        let a = KeyPair::generate();
        let sig = sign_for(&req, &a);
        req.sign(a.key_holder_id, "a", &a.public_hex(), &sig, 1_700_000_001).unwrap();
        let sig2 = sign_for(&req, &a);
        assert!(matches!(
            req.sign(a.key_holder_id, "a", &a.public_hex(), &sig2, 1_700_000_002),
            Err(ConsentError::AlreadySigned(_))
        ));
    }

    #[test]
    fn expired_request_rejects_further_signatures() {
        let mut req = RestoreRequest::create(
            "alice".into(),
            "latest".into(),
            vec![],
            "reason".into(),
            1,
            1_700_000_000,
        );
        let a = KeyPair::generate();
        let sig = sign_for(&req, &a);
        let far_future = req.expires_at + 1;
        let result = req.sign(a.key_holder_id, "a", &a.public_hex(), &sig, far_future);
        assert!(matches!(result, Err(ConsentError::BadState(_))));
        assert_eq!(req.status, RequestStatus::Expired);
    }

    #[test]
    fn deny_is_terminal() {
        let mut req = RestoreRequest::create("alice".into(), "latest".into(), vec![], "r".into(), 1, 1_700_000_000);
        req.deny(1_700_000_001).unwrap();
        assert_eq!(req.status, RequestStatus::Denied);
        assert!(matches!(req.deny(1_700_000_002), Err(ConsentError::BadState(_))));
    }
}
