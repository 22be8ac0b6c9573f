use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::SigError;
use crate::hash::key_holder_id_from_public_bytes;
use qvault_core::types::KeyHolderId;

/// An Ed25519 keypair held by a key-holder. The signing key zeroizes itself
/// on drop (`ed25519_dalek`'s `zeroize` feature); there is no raw secret
/// byte buffer in this type for us to forget to scrub.
pub struct KeyPair {
    pub key_holder_id: KeyHolderId,
    pub public_key: VerifyingKey,
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generates a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Reconstructs a keypair from raw 32-byte secret key material (e.g.
    /// loaded from a `VaultConfig` file).
    pub fn from_raw(secret_bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret_bytes);
        Self::from_signing_key(signing_key)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let public_key = signing_key.verifying_key();
        let key_holder_id = key_holder_id_from_public_bytes(public_key.as_bytes());
        Self {
            key_holder_id,
            public_key,
            signing_key,
        }
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public_key.to_bytes())
    }

    pub fn sign(&self, msg: &[u8]) -> String {
        hex::encode(self.signing_key.sign(msg).to_bytes())
    }
}

/// Parses a lowercase-hex Ed25519 public key.
pub fn parse_public_key(hex_str: &str) -> Result<VerifyingKey, SigError> {
    let bytes = hex::decode(hex_str).map_err(|e| SigError::BadEncoding(e.to_string()))?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| SigError::BadKey)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| SigError::BadKey)
}

/// Verifies a hex-encoded signature against a hex-encoded public key and a
/// message. Returns `Ok(())` on success so call sites can use `?` and map
/// any failure uniformly to `SigError::InvalidSignature` — this keeps
/// verification failures from leaking which stage (key parse, signature
/// parse, cryptographic check) rejected the input.
pub fn verify(pub_key_hex: &str, msg: &[u8], sig_hex: &str) -> Result<(), SigError> {
    use ed25519_dalek::Verifier;

    let public_key = parse_public_key(pub_key_hex)?;
    let sig_bytes = hex::decode(sig_hex).map_err(|_| SigError::InvalidSignature)?;
    let sig_arr: [u8; 64] = sig_bytes.try_into().map_err(|_| SigError::InvalidSignature)?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_arr);
    public_key
        .verify(msg, &signature)
        .map_err(|_| SigError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_succeeds() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(verify(&kp.public_hex(), b"hello", &sig).is_ok());
    }

    #[test]
    fn verify_under_wrong_key_fails() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let sig = kp2.sign(b"hello");
        assert!(verify(&kp1.public_hex(), b"hello", &sig).is_err());
    }

    #[test]
    fn verify_tampered_message_fails() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"laptop died");
        assert!(verify(&kp.public_hex(), b"steal data", &sig).is_err());
    }
}
