//! Deletion tickets and possession-proof challenges (C8).

pub mod challenge;
pub mod error;
pub mod ticket;

pub use challenge::{respond, verify_response, Challenge, ChallengeItem, Response, ResponseItem};
pub use error::TicketError;
pub use ticket::{DeletionTicket, Ledger, TicketTarget, UsageRecord};
