//! Canonical signing payloads (§6, bit-exact field lists). Each payload
//! struct here defines exactly the fields that are signed over for its
//! entity; domain crates build one of these from their own richer entity
//! type and call the matching `sign_*` / `verify_*` function rather than
//! re-deriving the field list themselves.

use serde::Serialize;

use crate::canonical::canonical_payload;
use crate::error::SigError;
use crate::keypair::{verify, KeyPair};

#[derive(Serialize)]
pub struct RestoreRequestPayload<'a> {
    pub id: &'a str,
    pub requester: &'a str,
    pub snapshot_id: &'a str,
    pub reason: &'a str,
    pub key_holder_id: &'a str,
    pub paths: &'a [String],
    pub created_at: i64,
}

pub fn sign_restore_request(kp: &KeyPair, payload: &RestoreRequestPayload<'_>) -> Result<String, SigError> {
    let bytes = canonical_payload(payload, &[])?;
    Ok(kp.sign(&bytes))
}

pub fn verify_restore_request(
    public_key_hex: &str,
    payload: &RestoreRequestPayload<'_>,
    sig_hex: &str,
) -> Result<(), SigError> {
    let bytes = canonical_payload(payload, &[])?;
    verify(public_key_hex, &bytes, sig_hex)
}

/// Not bit-exact in spec.md §6 (only RestoreRequest, DeletionTicket,
/// VerificationRecord, and Policy are specified there) — spec.md §4.4 says
/// the deletion lifecycle shares RestoreRequest's consent invariants, so
/// this payload mirrors `RestoreRequestPayload`'s shape with the fields
/// `DeletionRequest` actually carries (see DESIGN.md).
#[derive(Serialize)]
pub struct DeletionRequestPayload<'a> {
    pub id: &'a str,
    pub requester: &'a str,
    pub deletion_type: &'a str,
    pub snapshot_ids: &'a [String],
    pub paths: &'a [String],
    pub reason: &'a str,
    pub key_holder_id: &'a str,
    pub created_at: i64,
}

pub fn sign_deletion_request(kp: &KeyPair, payload: &DeletionRequestPayload<'_>) -> Result<String, SigError> {
    let bytes = canonical_payload(payload, &[])?;
    Ok(kp.sign(&bytes))
}

pub fn verify_deletion_request(
    public_key_hex: &str,
    payload: &DeletionRequestPayload<'_>,
    sig_hex: &str,
) -> Result<(), SigError> {
    let bytes = canonical_payload(payload, &[])?;
    verify(public_key_hex, &bytes, sig_hex)
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketTargetPayload {
    Snapshot { snapshot_id: String },
    Path { path: String },
    Prune { prune_cutoff: i64 },
}

#[derive(Serialize)]
pub struct DeletionTicketPayload<'a> {
    pub id: &'a str,
    pub target: &'a TicketTargetPayload,
    pub reason: &'a str,
    pub issued_at: i64,
    pub expires_at: i64,
    pub issuer_key_id: &'a str,
}

pub fn sign_deletion_ticket(kp: &KeyPair, payload: &DeletionTicketPayload<'_>) -> Result<String, SigError> {
    let bytes = canonical_payload(payload, &[])?;
    Ok(kp.sign(&bytes))
}

pub fn verify_deletion_ticket(
    public_key_hex: &str,
    payload: &DeletionTicketPayload<'_>,
    sig_hex: &str,
) -> Result<(), SigError> {
    let bytes = canonical_payload(payload, &[])?;
    verify(public_key_hex, &bytes, sig_hex)
}

#[derive(Serialize)]
pub struct VerificationRecordPayload<'a> {
    pub id: &'a str,
    pub snapshot_id: &'a str,
    pub created_at: i64,
    pub owner_key_id: &'a str,
    pub config_hash: &'a str,
    pub key_hashes: &'a [String],
    pub snapshot_hash: &'a str,
    pub data_merkle_root: &'a str,
    pub data_file_count: u64,
}

pub fn sign_verification_record(
    kp: &KeyPair,
    payload: &VerificationRecordPayload<'_>,
) -> Result<String, SigError> {
    let bytes = canonical_payload(payload, &[])?;
    Ok(kp.sign(&bytes))
}

pub fn verify_verification_record(
    public_key_hex: &str,
    payload: &VerificationRecordPayload<'_>,
    sig_hex: &str,
) -> Result<(), SigError> {
    let bytes = canonical_payload(payload, &[])?;
    verify(public_key_hex, &bytes, sig_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_request_round_trips() {
        let kp = KeyPair::generate();
        let paths = vec!["/home/a".to_string()];
        let payload = RestoreRequestPayload {
            id: "abc123",
            requester: "alice",
            snapshot_id: "latest",
            reason: "laptop died",
            key_holder_id: &kp.key_holder_id.to_hex(),
            paths: &paths,
            created_at: 1_700_000_000,
        };
        let sig = sign_restore_request(&kp, &payload).unwrap();
        assert!(verify_restore_request(&kp.public_hex(), &payload, &sig).is_ok());

        let tampered = RestoreRequestPayload {
            reason: "steal data",
            ..payload
        };
        assert!(verify_restore_request(&kp.public_hex(), &tampered, &sig).is_err());
    }
}
