use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use qvault_audit::{AuditEntry, VerifyResult};
use qvault_consensus::{DeletionRequest, RestoreRequest};
use qvault_integrity::{CheckOutcome, CheckerStatus, VerificationConfig};
use qvault_policy::Policy;
use qvault_schedule::{BackupResult, ScheduleSpec};
use qvault_tickets::{Challenge, DeletionTicket, Response};

use crate::types::{RpcCreateDeletionRequest, RpcCreatePolicy, RpcRegisterKeyHolder, RpcVaultInfo, RpcVerifyChallenge};

/// The owner/peer control-plane JSON-RPC 2.0 API. Method names are
/// prefixed with "qvault_" via `namespace = "qvault"`.
#[rpc(server, namespace = "qvault")]
pub trait QvaultApi {
    // ── Vault and key-holders (C4) ───────────────────────────────────────

    #[method(name = "getVault")]
    async fn get_vault(&self) -> RpcResult<RpcVaultInfo>;

    #[method(name = "registerKeyHolder")]
    async fn register_key_holder(&self, holder: RpcRegisterKeyHolder) -> RpcResult<RpcVaultInfo>;

    // ── Restore requests (C4) ────────────────────────────────────────────

    #[method(name = "createRestoreRequest")]
    async fn create_restore_request(
        &self,
        requester: String,
        snapshot_id: String,
        paths: Vec<String>,
        reason: String,
    ) -> RpcResult<RestoreRequest>;

    #[method(name = "getRestoreRequest")]
    async fn get_restore_request(&self, id: String) -> RpcResult<Option<RestoreRequest>>;

    #[method(name = "listRestoreRequests")]
    async fn list_restore_requests(&self) -> RpcResult<Vec<RestoreRequest>>;

    #[method(name = "signRestoreRequest")]
    async fn sign_restore_request(
        &self,
        id: String,
        key_holder_id: String,
        signature: String,
    ) -> RpcResult<RestoreRequest>;

    #[method(name = "approveRestoreWithShare")]
    async fn approve_restore_with_share(
        &self,
        id: String,
        key_holder_id: String,
        index: u8,
        data_hex: String,
    ) -> RpcResult<RestoreRequest>;

    #[method(name = "denyRestoreRequest")]
    async fn deny_restore_request(&self, id: String) -> RpcResult<RestoreRequest>;

    // ── Deletion requests (C4) ───────────────────────────────────────────

    #[method(name = "createDeletionRequest")]
    async fn create_deletion_request(&self, request: RpcCreateDeletionRequest) -> RpcResult<DeletionRequest>;

    #[method(name = "getDeletionRequest")]
    async fn get_deletion_request(&self, id: String) -> RpcResult<Option<DeletionRequest>>;

    #[method(name = "listDeletionRequests")]
    async fn list_deletion_requests(&self) -> RpcResult<Vec<DeletionRequest>>;

    #[method(name = "signDeletionRequest")]
    async fn sign_deletion_request(
        &self,
        id: String,
        key_holder_id: String,
        signature: String,
    ) -> RpcResult<DeletionRequest>;

    #[method(name = "denyDeletionRequest")]
    async fn deny_deletion_request(&self, id: String) -> RpcResult<DeletionRequest>;

    // ── Policy (C5) ───────────────────────────────────────────────────────

    #[method(name = "createPolicy")]
    async fn create_policy(&self, policy: RpcCreatePolicy) -> RpcResult<Policy>;

    #[method(name = "signPolicyAsOwner")]
    async fn sign_policy_as_owner(&self, policy: Policy) -> RpcResult<Policy>;

    #[method(name = "getActivePolicy")]
    async fn get_active_policy(&self) -> RpcResult<Option<Policy>>;

    // ── Schedule (C3) ─────────────────────────────────────────────────────

    #[method(name = "getSchedule")]
    async fn get_schedule(&self) -> RpcResult<String>;

    #[method(name = "updateSchedule")]
    async fn update_schedule(&self, spec: String) -> RpcResult<String>;

    #[method(name = "getBackupHistory")]
    async fn get_backup_history(&self) -> RpcResult<Vec<BackupResult>>;

    #[method(name = "triggerBackupNow")]
    async fn trigger_backup_now(&self) -> RpcResult<BackupResult>;

    // ── Tickets and challenges (C8) ──────────────────────────────────────

    #[method(name = "issueDeletionTicket")]
    async fn issue_deletion_ticket(
        &self,
        target: qvault_tickets::TicketTarget,
        reason: String,
        expires_at: i64,
    ) -> RpcResult<DeletionTicket>;

    #[method(name = "createChallenge")]
    async fn create_challenge(&self, blob_ids: Vec<String>, expires_at: i64) -> RpcResult<Challenge>;

    #[method(name = "verifyChallengeResponse")]
    async fn verify_challenge_response(&self, request: RpcVerifyChallenge) -> RpcResult<bool>;

    // ── Audit (C7) ────────────────────────────────────────────────────────

    #[method(name = "getAuditEntries")]
    async fn get_audit_entries(
        &self,
        limit: usize,
        offset: usize,
        op_filter: Option<String>,
    ) -> RpcResult<Vec<AuditEntry>>;

    #[method(name = "verifyAuditChain")]
    async fn verify_audit_chain(&self) -> RpcResult<VerifyResult>;

    #[method(name = "exportAuditChain")]
    async fn export_audit_chain(&self) -> RpcResult<String>;

    // ── Integrity (C6) ────────────────────────────────────────────────────

    #[method(name = "getIntegrityConfig")]
    async fn get_integrity_config(&self) -> RpcResult<VerificationConfig>;

    #[method(name = "updateIntegrityConfig")]
    async fn update_integrity_config(&self, config: VerificationConfig) -> RpcResult<()>;

    #[method(name = "getIntegrityStatus")]
    async fn get_integrity_status(&self) -> RpcResult<CheckerStatus>;

    #[method(name = "runIntegrityCheckNow")]
    async fn run_integrity_check_now(&self) -> RpcResult<CheckOutcome>;
}
