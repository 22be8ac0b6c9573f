//! Boundary to the external backup-repository tool (spec.md §1 names this
//! explicitly out of scope; its call shape is in scope). The schedule
//! engine (C3) and the CLI only ever see the [`BackupRepo`] trait — which
//! external tool actually runs, and how, is [`subprocess::SubprocessRepo`]'s
//! concern alone.

pub mod error;
pub mod subprocess;

pub use error::RepoError;
pub use subprocess::SubprocessRepo;

use async_trait::async_trait;
use qvault_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// One snapshot as reported by the repository tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub created_at: Timestamp,
    pub paths: Vec<String>,
}

/// The operations the rest of the workspace needs from a backup repository
/// tool: initialise, take a backup, list snapshots, restore one. Everything
/// else about the tool (its wire format, its binary name, its retention
/// commands) stays behind this trait.
#[async_trait]
pub trait BackupRepo: Send + Sync {
    /// Initialises a fresh repository at the configured location. A no-op
    /// if the repository already exists.
    async fn init(&self) -> Result<(), RepoError>;

    /// Backs up `paths`, returning the id of the new snapshot.
    async fn backup(&self, paths: &[String]) -> Result<String, RepoError>;

    /// Lists all snapshots, newest first.
    async fn snapshots(&self) -> Result<Vec<Snapshot>, RepoError>;

    /// Restores `snapshot_id` into `target`.
    async fn restore(&self, snapshot_id: &str, target: &str) -> Result<(), RepoError>;
}
