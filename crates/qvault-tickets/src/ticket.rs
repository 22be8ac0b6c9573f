//! Owner-signed deletion tickets (C8): scope-limited, time-bounded
//! authorisation for the storage guard to honour a specific delete.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use qvault_core::types::Timestamp;
use qvault_crypto::keypair::KeyPair;
use qvault_crypto::signing::{sign_deletion_ticket, verify_deletion_ticket, DeletionTicketPayload, TicketTargetPayload};

use crate::error::TicketError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TicketTarget {
    Snapshot { snapshot_id: String },
    Path { path: String },
    Prune { prune_cutoff: Timestamp },
}

impl TicketTarget {
    fn to_payload(&self) -> TicketTargetPayload {
        match self {
            TicketTarget::Snapshot { snapshot_id } => TicketTargetPayload::Snapshot {
                snapshot_id: snapshot_id.clone(),
            },
            TicketTarget::Path { path } => TicketTargetPayload::Path { path: path.clone() },
            TicketTarget::Prune { prune_cutoff } => TicketTargetPayload::Prune {
                prune_cutoff: *prune_cutoff,
            },
        }
    }

    /// A string that uniquely identifies this target for reuse tracking —
    /// redeeming a ticket twice against the same snapshot/path/cutoff is
    /// rejected even though the ticket itself may cover more than one use.
    pub fn reuse_key(&self) -> String {
        match self {
            TicketTarget::Snapshot { snapshot_id } => format!("snapshot:{snapshot_id}"),
            TicketTarget::Path { path } => format!("path:{path}"),
            TicketTarget::Prune { prune_cutoff } => format!("prune:{prune_cutoff}"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageRecord {
    pub used_at: Timestamp,
    pub target_key: String,
    pub result: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletionTicket {
    pub id: String,
    pub target: TicketTarget,
    pub reason: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub issuer_key_id: String,
    #[serde(default)]
    pub owner_signature: Option<String>,
    #[serde(default)]
    pub usage_records: Vec<UsageRecord>,
}

impl DeletionTicket {
    pub fn new(
        id: String,
        target: TicketTarget,
        reason: String,
        issued_at: Timestamp,
        expires_at: Timestamp,
        issuer_key_id: String,
    ) -> Self {
        Self {
            id,
            target,
            reason,
            issued_at,
            expires_at,
            issuer_key_id,
            owner_signature: None,
            usage_records: Vec::new(),
        }
    }

    fn payload(&self) -> DeletionTicketPayload<'_> {
        DeletionTicketPayload {
            id: &self.id,
            target: &self.target.to_payload(),
            reason: &self.reason,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            issuer_key_id: &self.issuer_key_id,
        }
    }

    pub fn sign(&mut self, kp: &KeyPair) -> Result<(), TicketError> {
        let sig = sign_deletion_ticket(kp, &self.payload())?;
        self.owner_signature = Some(sig);
        Ok(())
    }

    pub fn verify(&self, issuer_public_key_hex: &str) -> Result<(), TicketError> {
        let sig = self.owner_signature.as_deref().ok_or(TicketError::BadSignature)?;
        verify_deletion_ticket(issuer_public_key_hex, &self.payload(), sig)
            .map_err(|_| TicketError::BadSignature)
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// In-memory registry of tickets known to the storage guard. Persistence is
/// the host binary's concern (one JSON file per ticket, matching every
/// other entity in this workspace); this type holds the authoritative
/// in-process view and is the single choke point through which a delete is
/// ever marked used (§9 open question (b)).
#[derive(Default)]
pub struct Ledger {
    tickets: HashMap<String, DeletionTicket>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ticket after verifying its owner signature. Rejects an
    /// unsigned or badly signed ticket outright; does not check expiry here
    /// since an already-expired ticket may still be worth recording for
    /// audit purposes, but `redeem` will refuse to honour it.
    pub fn register(&mut self, ticket: DeletionTicket, issuer_public_key_hex: &str) -> Result<(), TicketError> {
        ticket.verify(issuer_public_key_hex)?;
        self.tickets.insert(ticket.id.clone(), ticket);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DeletionTicket> {
        self.tickets.get(id)
    }

    /// The only path that marks a ticket used. Checks expiry and rejects a
    /// second redemption against the same target.
    pub fn redeem(&mut self, id: &str, now: Timestamp) -> Result<(), TicketError> {
        let ticket = self.tickets.get_mut(id).ok_or_else(|| TicketError::NotFound(id.to_string()))?;
        if ticket.is_expired(now) {
            return Err(TicketError::Expired(id.to_string()));
        }
        let key = ticket.target.reuse_key();
        if ticket.usage_records.iter().any(|u| u.target_key == key) {
            return Err(TicketError::AlreadyUsed(id.to_string()));
        }
        ticket.usage_records.push(UsageRecord {
            used_at: now,
            target_key: key,
            result: "used".to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_ticket_verifies() {
        let kp = KeyPair::generate();
        let mut ticket = DeletionTicket::new(
            "t1".into(),
            TicketTarget::Snapshot {
                snapshot_id: "snap-1".into(),
            },
            "cleanup".into(),
            1_700_000_000,
            1_700_100_000,
            kp.key_holder_id.to_hex(),
        );
        ticket.sign(&kp).unwrap();
        assert!(ticket.verify(&kp.public_hex()).is_ok());
    }

    #[test]
    fn redeem_rejects_reuse_against_same_target() {
        let kp = KeyPair::generate();
        let mut ticket = DeletionTicket::new(
            "t1".into(),
            TicketTarget::Snapshot {
                snapshot_id: "snap-1".into(),
            },
            "cleanup".into(),
            1_700_000_000,
            1_700_100_000,
            kp.key_holder_id.to_hex(),
        );
        ticket.sign(&kp).unwrap();

        let mut ledger = Ledger::new();
        ledger.register(ticket, &kp.public_hex()).unwrap();
        ledger.redeem("t1", 1_700_000_500).unwrap();
        assert!(matches!(
            ledger.redeem("t1", 1_700_000_600),
            Err(TicketError::AlreadyUsed(_))
        ));
    }

    #[test]
    fn redeem_rejects_expired_ticket() {
        let kp = KeyPair::generate();
        let mut ticket = DeletionTicket::new(
            "t1".into(),
            TicketTarget::Path { path: "/data/x".into() },
            "cleanup".into(),
            1_700_000_000,
            1_700_000_100,
            kp.key_holder_id.to_hex(),
        );
        ticket.sign(&kp).unwrap();
        let mut ledger = Ledger::new();
        ledger.register(ticket, &kp.public_hex()).unwrap();
        assert!(matches!(
            ledger.redeem("t1", 1_700_000_999),
            Err(TicketError::Expired(_))
        ));
    }

    #[test]
    fn unsigned_ticket_rejected_at_register() {
        let kp = KeyPair::generate();
        let ticket = DeletionTicket::new(
            "t1".into(),
            TicketTarget::Prune { prune_cutoff: 1_600_000_000 },
            "cleanup".into(),
            1_700_000_000,
            1_700_100_000,
            kp.key_holder_id.to_hex(),
        );
        let mut ledger = Ledger::new();
        assert!(ledger.register(ticket, &kp.public_hex()).is_err());
    }
}
