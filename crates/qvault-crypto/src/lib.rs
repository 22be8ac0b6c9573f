//! Ed25519 signing, SHA-256 hashing, and the canonical payload construction
//! that every signed entity in the workspace (§6) builds its signing bytes
//! from.

pub mod canonical;
pub mod error;
pub mod hash;
pub mod keypair;
pub mod signing;

pub use canonical::canonical_payload;
pub use error::SigError;
pub use hash::{key_holder_id_from_public_bytes, key_holder_id_from_public_hex, sha256, sha256_hex};
pub use keypair::{parse_public_key, verify, KeyPair};
pub use signing::{
    sign_deletion_request, sign_deletion_ticket, sign_restore_request, sign_verification_record,
    verify_deletion_request, verify_deletion_ticket, verify_restore_request, verify_verification_record,
    DeletionRequestPayload, DeletionTicketPayload, RestoreRequestPayload, TicketTargetPayload, VerificationRecordPayload,
};
