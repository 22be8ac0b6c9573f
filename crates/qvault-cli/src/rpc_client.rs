//! JSON-RPC 2.0 client for talking to a running `qvault-node`.
//!
//! Uses raw HTTP POST with serde_json rather than the full jsonrpsee
//! client to keep the CLI binary lean and dependency-minimal.

use anyhow::{bail, Context};

use qvault_audit::{AuditEntry, VerifyResult};
use qvault_consensus::{DeletionRequest, RestoreRequest};
use qvault_integrity::{CheckOutcome, CheckerStatus, VerificationConfig};
use qvault_policy::Policy;
use qvault_rpc::{RpcCreateDeletionRequest, RpcCreatePolicy, RpcRegisterKeyHolder, RpcVaultInfo, RpcVerifyChallenge};
use qvault_schedule::BackupResult;
use qvault_tickets::{Challenge, DeletionTicket, TicketTarget};

pub struct NodeRpcClient {
    url: String,
    client: reqwest::Client,
}

impl NodeRpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Calls a JSON-RPC method and returns its `result` field.
    async fn call(&self, method: &str, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("connecting to node at {}", self.url))?;

        let json: serde_json::Value = resp.json().await.context("parsing RPC response")?;

        if let Some(err) = json.get("error") {
            bail!("RPC error: {}", err);
        }

        Ok(json["result"].clone())
    }

    fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> anyhow::Result<T> {
        serde_json::from_value(value).context("decoding RPC result")
    }

    // ── Vault and key-holders ────────────────────────────────────────────────

    pub async fn get_vault(&self) -> anyhow::Result<RpcVaultInfo> {
        Self::decode(self.call("qvault_getVault", serde_json::json!([])).await?)
    }

    pub async fn register_key_holder(&self, holder: RpcRegisterKeyHolder) -> anyhow::Result<RpcVaultInfo> {
        Self::decode(self.call("qvault_registerKeyHolder", serde_json::json!([holder])).await?)
    }

    // ── Restore requests ─────────────────────────────────────────────────────

    pub async fn create_restore_request(&self, requester: &str, snapshot_id: &str, paths: Vec<String>, reason: &str) -> anyhow::Result<RestoreRequest> {
        Self::decode(
            self.call("qvault_createRestoreRequest", serde_json::json!([requester, snapshot_id, paths, reason]))
                .await?,
        )
    }

    pub async fn get_restore_request(&self, id: &str) -> anyhow::Result<Option<RestoreRequest>> {
        Self::decode(self.call("qvault_getRestoreRequest", serde_json::json!([id])).await?)
    }

    pub async fn list_restore_requests(&self) -> anyhow::Result<Vec<RestoreRequest>> {
        Self::decode(self.call("qvault_listRestoreRequests", serde_json::json!([])).await?)
    }

    pub async fn sign_restore_request(&self, id: &str, key_holder_id: &str, signature: &str) -> anyhow::Result<RestoreRequest> {
        Self::decode(
            self.call("qvault_signRestoreRequest", serde_json::json!([id, key_holder_id, signature]))
                .await?,
        )
    }

    pub async fn approve_restore_with_share(&self, id: &str, key_holder_id: &str, index: u8, data_hex: &str) -> anyhow::Result<RestoreRequest> {
        Self::decode(
            self.call(
                "qvault_approveRestoreWithShare",
                serde_json::json!([id, key_holder_id, index, data_hex]),
            )
            .await?,
        )
    }

    pub async fn deny_restore_request(&self, id: &str) -> anyhow::Result<RestoreRequest> {
        Self::decode(self.call("qvault_denyRestoreRequest", serde_json::json!([id])).await?)
    }

    // ── Deletion requests ────────────────────────────────────────────────────

    pub async fn create_deletion_request(&self, request: RpcCreateDeletionRequest) -> anyhow::Result<DeletionRequest> {
        Self::decode(self.call("qvault_createDeletionRequest", serde_json::json!([request])).await?)
    }

    pub async fn get_deletion_request(&self, id: &str) -> anyhow::Result<Option<DeletionRequest>> {
        Self::decode(self.call("qvault_getDeletionRequest", serde_json::json!([id])).await?)
    }

    pub async fn list_deletion_requests(&self) -> anyhow::Result<Vec<DeletionRequest>> {
        Self::decode(self.call("qvault_listDeletionRequests", serde_json::json!([])).await?)
    }

    pub async fn sign_deletion_request(&self, id: &str, key_holder_id: &str, signature: &str) -> anyhow::Result<DeletionRequest> {
        Self::decode(
            self.call("qvault_signDeletionRequest", serde_json::json!([id, key_holder_id, signature]))
                .await?,
        )
    }

    pub async fn deny_deletion_request(&self, id: &str) -> anyhow::Result<DeletionRequest> {
        Self::decode(self.call("qvault_denyDeletionRequest", serde_json::json!([id])).await?)
    }

    // ── Policy ───────────────────────────────────────────────────────────────

    pub async fn create_policy(&self, policy: RpcCreatePolicy) -> anyhow::Result<Policy> {
        Self::decode(self.call("qvault_createPolicy", serde_json::json!([policy])).await?)
    }

    pub async fn sign_policy_as_owner(&self, policy: &Policy) -> anyhow::Result<Policy> {
        Self::decode(self.call("qvault_signPolicyAsOwner", serde_json::json!([policy])).await?)
    }

    pub async fn get_active_policy(&self) -> anyhow::Result<Option<Policy>> {
        Self::decode(self.call("qvault_getActivePolicy", serde_json::json!([])).await?)
    }

    // ── Schedule ─────────────────────────────────────────────────────────────

    pub async fn get_schedule(&self) -> anyhow::Result<String> {
        Self::decode(self.call("qvault_getSchedule", serde_json::json!([])).await?)
    }

    pub async fn update_schedule(&self, spec: &str) -> anyhow::Result<String> {
        Self::decode(self.call("qvault_updateSchedule", serde_json::json!([spec])).await?)
    }

    pub async fn get_backup_history(&self) -> anyhow::Result<Vec<BackupResult>> {
        Self::decode(self.call("qvault_getBackupHistory", serde_json::json!([])).await?)
    }

    pub async fn trigger_backup_now(&self) -> anyhow::Result<BackupResult> {
        Self::decode(self.call("qvault_triggerBackupNow", serde_json::json!([])).await?)
    }

    // ── Tickets and challenges ───────────────────────────────────────────────

    pub async fn issue_deletion_ticket(&self, target: TicketTarget, reason: &str, expires_at: i64) -> anyhow::Result<DeletionTicket> {
        Self::decode(
            self.call("qvault_issueDeletionTicket", serde_json::json!([target, reason, expires_at]))
                .await?,
        )
    }

    pub async fn create_challenge(&self, blob_ids: Vec<String>, expires_at: i64) -> anyhow::Result<Challenge> {
        Self::decode(self.call("qvault_createChallenge", serde_json::json!([blob_ids, expires_at])).await?)
    }

    pub async fn verify_challenge_response(&self, request: RpcVerifyChallenge) -> anyhow::Result<bool> {
        Self::decode(self.call("qvault_verifyChallengeResponse", serde_json::json!([request])).await?)
    }

    // ── Audit ────────────────────────────────────────────────────────────────

    pub async fn get_audit_entries(&self, limit: usize, offset: usize, op_filter: Option<String>) -> anyhow::Result<Vec<AuditEntry>> {
        Self::decode(
            self.call("qvault_getAuditEntries", serde_json::json!([limit, offset, op_filter]))
                .await?,
        )
    }

    pub async fn verify_audit_chain(&self) -> anyhow::Result<VerifyResult> {
        Self::decode(self.call("qvault_verifyAuditChain", serde_json::json!([])).await?)
    }

    pub async fn export_audit_chain(&self) -> anyhow::Result<String> {
        Self::decode(self.call("qvault_exportAuditChain", serde_json::json!([])).await?)
    }

    // ── Integrity ────────────────────────────────────────────────────────────

    pub async fn get_integrity_config(&self) -> anyhow::Result<VerificationConfig> {
        Self::decode(self.call("qvault_getIntegrityConfig", serde_json::json!([])).await?)
    }

    pub async fn update_integrity_config(&self, config: VerificationConfig) -> anyhow::Result<()> {
        self.call("qvault_updateIntegrityConfig", serde_json::json!([config])).await?;
        Ok(())
    }

    pub async fn get_integrity_status(&self) -> anyhow::Result<CheckerStatus> {
        Self::decode(self.call("qvault_getIntegrityStatus", serde_json::json!([])).await?)
    }

    pub async fn run_integrity_check_now(&self) -> anyhow::Result<CheckOutcome> {
        Self::decode(self.call("qvault_runIntegrityCheckNow", serde_json::json!([])).await?)
    }
}
