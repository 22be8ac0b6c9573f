//! Proof-of-possession challenge/response (C8): the owner spot-checks that
//! the host still holds specific blobs without downloading them.

use serde::{Deserialize, Serialize};

use qvault_core::types::Timestamp;
use qvault_crypto::canonical::canonical_payload;
use qvault_crypto::hash::sha256_hex;
use qvault_crypto::keypair::{verify, KeyPair};

use crate::error::TicketError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeItem {
    pub blob_id: String,
    /// Hex-encoded random nonce, unique per item.
    pub nonce: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub items: Vec<ChallengeItem>,
    pub expires_at: Timestamp,
    #[serde(default)]
    pub owner_signature: Option<String>,
}

impl Challenge {
    pub fn new(id: String, items: Vec<ChallengeItem>, expires_at: Timestamp) -> Self {
        Self {
            id,
            items,
            expires_at,
            owner_signature: None,
        }
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, TicketError> {
        canonical_payload(self, &["owner_signature"]).map_err(TicketError::from)
    }

    pub fn sign(&mut self, kp: &KeyPair) -> Result<(), TicketError> {
        let bytes = self.canonical_bytes()?;
        self.owner_signature = Some(kp.sign(&bytes));
        Ok(())
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseItem {
    pub blob_id: String,
    /// Hex `H(nonce ‖ blob_contents)`.
    pub digest: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    pub challenge_id: String,
    pub items: Vec<ResponseItem>,
    #[serde(default)]
    pub host_signature: Option<String>,
}

impl Response {
    fn canonical_bytes(&self) -> Result<Vec<u8>, TicketError> {
        canonical_payload(self, &["host_signature"]).map_err(TicketError::from)
    }

    pub fn sign(&mut self, host_kp: &KeyPair) -> Result<(), TicketError> {
        let bytes = self.canonical_bytes()?;
        self.host_signature = Some(host_kp.sign(&bytes));
        Ok(())
    }

    pub fn verify_signature(&self, host_public_key_hex: &str) -> Result<(), TicketError> {
        let sig = self.host_signature.as_deref().ok_or(TicketError::BadResponseSignature)?;
        let bytes = self.canonical_bytes()?;
        verify(host_public_key_hex, &bytes, sig).map_err(|_| TicketError::BadResponseSignature)
    }
}

/// Host-side: computes and signs the response to `challenge` given a blob
/// lookup function. A missing blob yields no item for that id, which the
/// owner's verification treats as proof of loss.
pub fn respond(
    challenge: &Challenge,
    host_kp: &KeyPair,
    fetch_blob: impl Fn(&str) -> Option<Vec<u8>>,
) -> Result<Response, TicketError> {
    let mut items = Vec::with_capacity(challenge.items.len());
    for item in &challenge.items {
        if let Some(contents) = fetch_blob(&item.blob_id) {
            let nonce_bytes = hex::decode(&item.nonce).map_err(|e| TicketError::Serialization(e.to_string()))?;
            let mut preimage = nonce_bytes;
            preimage.extend_from_slice(&contents);
            items.push(ResponseItem {
                blob_id: item.blob_id.clone(),
                digest: sha256_hex(&preimage),
            });
        }
    }
    let mut response = Response {
        challenge_id: challenge.id.clone(),
        items,
        host_signature: None,
    };
    response.sign(host_kp)?;
    Ok(response)
}

/// Owner-side: verifies the host's signature, then checks that every
/// requested blob is present in the response and its digest matches
/// `expected_contents` (the owner's own copy, or a digest computed against
/// a registered verification record). Any mismatch or missing blob proves
/// the host no longer has the data.
pub fn verify_response(
    challenge: &Challenge,
    response: &Response,
    host_public_key_hex: &str,
    now: Timestamp,
    expected_contents: impl Fn(&str) -> Option<Vec<u8>>,
) -> Result<(), TicketError> {
    if challenge.is_expired(now) {
        return Err(TicketError::ChallengeExpired(challenge.id.clone()));
    }
    if response.challenge_id != challenge.id {
        return Err(TicketError::ChallengeNotFound(response.challenge_id.clone()));
    }
    response.verify_signature(host_public_key_hex)?;

    for item in &challenge.items {
        let got = response
            .items
            .iter()
            .find(|r| r.blob_id == item.blob_id)
            .ok_or_else(|| TicketError::MissingBlob(item.blob_id.clone()))?;

        let contents = expected_contents(&item.blob_id).ok_or_else(|| TicketError::MissingBlob(item.blob_id.clone()))?;
        let nonce_bytes = hex::decode(&item.nonce).map_err(|e| TicketError::Serialization(e.to_string()))?;
        let mut preimage = nonce_bytes;
        preimage.extend_from_slice(&contents);
        let expected_digest = sha256_hex(&preimage);
        if expected_digest != got.digest {
            return Err(TicketError::DigestMismatch(item.blob_id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn honest_host_passes_challenge() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();

        let mut blobs: HashMap<String, Vec<u8>> = HashMap::new();
        blobs.insert("blob-a".into(), b"hello world".to_vec());

        let mut challenge = Challenge::new(
            "c1".into(),
            vec![ChallengeItem {
                blob_id: "blob-a".into(),
                nonce: hex::encode(b"nonce1"),
            }],
            1_700_100_000,
        );
        challenge.sign(&owner_kp).unwrap();

        let response = respond(&challenge, &host_kp, |id| blobs.get(id).cloned()).unwrap();
        assert!(verify_response(&challenge, &response, &host_kp.public_hex(), 1_700_000_500, |id| {
            blobs.get(id).cloned()
        })
        .is_ok());
    }

    #[test]
    fn dishonest_host_missing_blob_fails() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();

        let blobs: HashMap<String, Vec<u8>> = HashMap::new();
        let mut challenge = Challenge::new(
            "c1".into(),
            vec![ChallengeItem {
                blob_id: "blob-a".into(),
                nonce: hex::encode(b"nonce1"),
            }],
            1_700_100_000,
        );
        challenge.sign(&owner_kp).unwrap();

        let response = respond(&challenge, &host_kp, |id| blobs.get(id).cloned()).unwrap();
        assert!(matches!(
            verify_response(&challenge, &response, &host_kp.public_hex(), 1_700_000_500, |_| Some(
                b"hello world".to_vec()
            )),
            Err(TicketError::MissingBlob(_))
        ));
    }

    #[test]
    fn tampered_contents_fails_digest_check() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();
        let mut blobs: HashMap<String, Vec<u8>> = HashMap::new();
        blobs.insert("blob-a".into(), b"original bytes".to_vec());

        let mut challenge = Challenge::new(
            "c1".into(),
            vec![ChallengeItem {
                blob_id: "blob-a".into(),
                nonce: hex::encode(b"nonce1"),
            }],
            1_700_100_000,
        );
        challenge.sign(&owner_kp).unwrap();

        let response = respond(&challenge, &host_kp, |id| blobs.get(id).cloned()).unwrap();
        assert!(matches!(
            verify_response(&challenge, &response, &host_kp.public_hex(), 1_700_000_500, |_| Some(
                b"tampered bytes".to_vec()
            )),
            Err(TicketError::DigestMismatch(_))
        ));
    }

    #[test]
    fn expired_challenge_rejected() {
        let owner_kp = KeyPair::generate();
        let host_kp = KeyPair::generate();
        let blobs: HashMap<String, Vec<u8>> = HashMap::new();
        let mut challenge = Challenge::new("c1".into(), vec![], 1_700_000_000);
        challenge.sign(&owner_kp).unwrap();
        let response = respond(&challenge, &host_kp, |id| blobs.get(id).cloned()).unwrap();
        assert!(matches!(
            verify_response(&challenge, &response, &host_kp.public_hex(), 1_700_000_001, |_| None),
            Err(TicketError::ChallengeExpired(_))
        ));
    }
}
