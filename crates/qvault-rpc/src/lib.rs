//! JSON-RPC 2.0 server for the owner/peer control plane.
//!
//! Namespace: "qvault"
//! Covers the consent manager (C4), storage policy (C5), backup scheduler
//! (C3), deletion tickets and possession challenges (C8), the audit chain
//! (C7), and the scheduled integrity checker (C6). The storage host's blob
//! surface (C9) is a separate HTTP API exposed by `qvault-storage`, not
//! this namespace.

pub mod api;
pub mod server;
pub mod types;

pub use server::RpcServer;
pub use server::RpcServerState;
pub use types::{RpcCreateDeletionRequest, RpcCreatePolicy, RpcRegisterKeyHolder, RpcVaultInfo, RpcVerifyChallenge};
