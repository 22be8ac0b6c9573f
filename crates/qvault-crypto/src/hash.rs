use sha2::{Digest, Sha256};

use qvault_core::types::{KeyHolderId, Sha256Digest};

pub fn sha256(bytes: &[u8]) -> Sha256Digest {
    let digest = Sha256::digest(bytes);
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    Sha256Digest::from_bytes(arr)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    sha256(bytes).to_hex()
}

/// Key-holder id: lower-hex of the first 8 bytes of SHA-256 of the raw
/// 32-byte Ed25519 public key (§4.2).
pub fn key_holder_id_from_public_bytes(public_key: &[u8; 32]) -> KeyHolderId {
    let digest = Sha256::digest(public_key);
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&digest[..8]);
    KeyHolderId::from_bytes(arr)
}

pub fn key_holder_id_from_public_hex(public_key_hex: &str) -> Result<KeyHolderId, hex::FromHexError> {
    let bytes = hex::decode(public_key_hex)?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| hex::FromHexError::InvalidStringLength)?;
    Ok(key_holder_id_from_public_bytes(&arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_holder_id_is_pure_function_of_public_key() {
        let a = key_holder_id_from_public_bytes(&[7u8; 32]);
        let b = key_holder_id_from_public_bytes(&[7u8; 32]);
        assert_eq!(a, b);
        let c = key_holder_id_from_public_bytes(&[8u8; 32]);
        assert_ne!(a, c);
    }
}
