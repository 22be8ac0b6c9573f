//! JSON-RPC server implementation: `RpcServerState` bundles every handle
//! the owner/peer daemon needs to answer a request, and `RpcServer` wires
//! `QvaultApiServer` onto a `jsonrpsee` HTTP listener.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use qvault_audit::{AuditEntry, Chain, VerifyResult};
use qvault_consensus::{ConsentManager, DeletionRequest, RestoreRequest};
use qvault_core::types::{now, KeyHolderId};
use qvault_core::FileStore;
use qvault_crypto::KeyPair;
use qvault_integrity::{AlertSink, CheckOutcome, CheckerStatus, ScheduledChecker, VerificationConfig};
use qvault_policy::Policy;
use qvault_schedule::{BackupFn, BackupResult, ScheduleCallbacks, ScheduleSpec, Scheduler};
use qvault_tickets::{verify_response, Challenge, ChallengeItem, DeletionTicket, Ledger};

use crate::api::QvaultApiServer;
use crate::types::{RpcCreateDeletionRequest, RpcCreatePolicy, RpcRegisterKeyHolder, RpcVaultInfo, RpcVerifyChallenge};

const ACTIVE_POLICY_ID: &str = "active";

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn bad_input(msg: impl std::fmt::Display) -> ErrorObject<'static> {
    rpc_err(-32602, msg.to_string())
}

fn internal(msg: impl std::fmt::Display) -> ErrorObject<'static> {
    rpc_err(-32603, msg.to_string())
}

fn random_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Everything the RPC handlers need to serve the "qvault" namespace. Built
/// once by the node binary at startup and shared across every connection.
pub struct RpcServerState {
    pub manager: Arc<ConsentManager>,
    /// The vault owner's own keypair, used to sign tickets and challenges
    /// issued from this process.
    pub owner_kp: KeyPair,
    pub policy_store: FileStore,
    active_policy: RwLock<Option<Policy>>,
    pub ticket_store: FileStore,
    ledger: RwLock<Ledger>,
    challenges: RwLock<HashMap<String, Challenge>>,
    pub audit: Arc<Chain>,
    pub scheduler: Arc<Scheduler>,
    pub backup_fn: BackupFn,
    pub schedule_callbacks: Arc<dyn ScheduleCallbacks>,
    pub checker: Arc<ScheduledChecker>,
    pub alert_sink: Arc<dyn AlertSink>,
}

impl RpcServerState {
    /// Loads the active policy (if one was ever set) and every persisted
    /// ticket from disk, re-verifying each ticket's signature against the
    /// owner's public key before trusting it in memory.
    pub fn open(
        manager: Arc<ConsentManager>,
        owner_kp: KeyPair,
        policy_store: FileStore,
        ticket_store: FileStore,
        audit: Arc<Chain>,
        scheduler: Arc<Scheduler>,
        backup_fn: BackupFn,
        schedule_callbacks: Arc<dyn ScheduleCallbacks>,
        checker: Arc<ScheduledChecker>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> std::io::Result<Self> {
        let active_policy: Option<Policy> = policy_store.load(ACTIVE_POLICY_ID)?;

        let mut ledger = Ledger::new();
        let owner_public_key = owner_kp.public_hex();
        for (id, ticket) in ticket_store.load_all::<DeletionTicket>()? {
            if let Err(e) = ledger.register(ticket, &owner_public_key) {
                tracing::warn!(ticket_id = %id, error = %e, "dropping unverifiable persisted ticket");
            }
        }

        Ok(Self {
            manager,
            owner_kp,
            policy_store,
            active_policy: RwLock::new(active_policy),
            ticket_store,
            ledger: RwLock::new(ledger),
            challenges: RwLock::new(HashMap::new()),
            audit,
            scheduler,
            backup_fn,
            schedule_callbacks,
            checker,
            alert_sink,
        })
    }
}

pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new().allow_methods(Any).allow_origin(Any).allow_headers(Any);
        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;
        let module = self.into_rpc();
        let handle = server.start(module);
        tracing::info!(%addr, "qvault RPC server started");
        Ok(handle)
    }
}

fn parse_key_holder_id(raw: &str) -> RpcResult<KeyHolderId> {
    KeyHolderId::from_hex(raw).map_err(|e| bad_input(format!("invalid key holder id: {e}")))
}

#[async_trait]
impl QvaultApiServer for RpcServer {
    // ── Vault and key-holders ────────────────────────────────────────────

    async fn get_vault(&self) -> RpcResult<RpcVaultInfo> {
        Ok(RpcVaultInfo::from(self.state.manager.vault()))
    }

    async fn register_key_holder(&self, holder: RpcRegisterKeyHolder) -> RpcResult<RpcVaultInfo> {
        let key_holder = qvault_consensus::KeyHolder::new(
            holder.name,
            holder.public_key,
            holder.network_address,
            holder.joined_at,
            holder.is_owner,
        )
        .map_err(|e| bad_input(e.to_string()))?;

        self.state
            .manager
            .register_key_holder(key_holder)
            .map_err(|e| bad_input(e.to_string()))?;

        if let Err(e) = self.state.audit.append("register_key_holder", &self.state.manager.vault().owner_name, "owner", now()) {
            tracing::warn!(error = %e, "failed to append audit entry for register_key_holder");
        }

        Ok(RpcVaultInfo::from(self.state.manager.vault()))
    }

    // ── Restore requests ─────────────────────────────────────────────────

    async fn create_restore_request(
        &self,
        requester: String,
        snapshot_id: String,
        paths: Vec<String>,
        reason: String,
    ) -> RpcResult<RestoreRequest> {
        self.state
            .manager
            .create_restore_request(requester, snapshot_id, paths, reason, now())
            .map_err(|e| internal(e.to_string()))
    }

    async fn get_restore_request(&self, id: String) -> RpcResult<Option<RestoreRequest>> {
        Ok(self.state.manager.get_restore_request(&id))
    }

    async fn list_restore_requests(&self) -> RpcResult<Vec<RestoreRequest>> {
        Ok(self.state.manager.list_restore_requests())
    }

    async fn sign_restore_request(&self, id: String, key_holder_id: String, signature: String) -> RpcResult<RestoreRequest> {
        let holder_id = parse_key_holder_id(&key_holder_id)?;
        self.state
            .manager
            .sign_restore_request(&id, holder_id, &signature, now())
            .map_err(|e| internal(e.to_string()))
    }

    async fn approve_restore_with_share(
        &self,
        id: String,
        key_holder_id: String,
        index: u8,
        data_hex: String,
    ) -> RpcResult<RestoreRequest> {
        let holder_id = parse_key_holder_id(&key_holder_id)?;
        self.state
            .manager
            .approve_restore_with_share(&id, holder_id, index, data_hex, now())
            .map_err(|e| internal(e.to_string()))
    }

    async fn deny_restore_request(&self, id: String) -> RpcResult<RestoreRequest> {
        self.state.manager.deny_restore_request(&id, now()).map_err(|e| internal(e.to_string()))
    }

    // ── Deletion requests ────────────────────────────────────────────────

    async fn create_deletion_request(&self, request: RpcCreateDeletionRequest) -> RpcResult<DeletionRequest> {
        self.state
            .manager
            .create_deletion_request(
                request.requester,
                request.deletion_type,
                request.snapshot_ids,
                request.paths,
                request.reason,
                request.required_approvals,
                now(),
            )
            .map_err(|e| internal(e.to_string()))
    }

    async fn get_deletion_request(&self, id: String) -> RpcResult<Option<DeletionRequest>> {
        Ok(self.state.manager.get_deletion_request(&id))
    }

    async fn list_deletion_requests(&self) -> RpcResult<Vec<DeletionRequest>> {
        Ok(self.state.manager.list_deletion_requests())
    }

    async fn sign_deletion_request(&self, id: String, key_holder_id: String, signature: String) -> RpcResult<DeletionRequest> {
        let holder_id = parse_key_holder_id(&key_holder_id)?;
        self.state
            .manager
            .sign_deletion_request(&id, holder_id, &signature, now())
            .map_err(|e| internal(e.to_string()))
    }

    async fn deny_deletion_request(&self, id: String) -> RpcResult<DeletionRequest> {
        self.state.manager.deny_deletion_request(&id, now()).map_err(|e| internal(e.to_string()))
    }

    // ── Policy ────────────────────────────────────────────────────────────

    async fn create_policy(&self, policy: RpcCreatePolicy) -> RpcResult<Policy> {
        let owner = qvault_policy::Identity {
            name: policy.owner_name,
            key_id: policy.owner_key_id,
            public_key: policy.owner_public_key,
        };
        let host = qvault_policy::Identity {
            name: policy.host_name,
            key_id: policy.host_key_id,
            public_key: policy.host_public_key,
        };
        let new_policy = Policy::new(
            owner,
            host,
            policy.retention_days,
            policy.deletion_mode,
            policy.max_storage_bytes,
            now(),
            policy.valid_until,
        );
        Ok(new_policy)
    }

    async fn sign_policy_as_owner(&self, mut policy: Policy) -> RpcResult<Policy> {
        policy.sign_as_owner(&self.state.owner_kp).map_err(|e| internal(e.to_string()))?;

        if policy.is_fully_signed() {
            policy.verify().map_err(|e| bad_input(e.to_string()))?;
            self.state
                .policy_store
                .save(ACTIVE_POLICY_ID, &policy)
                .map_err(|e| internal(e.to_string()))?;
            *self.state.active_policy.write().await = Some(policy.clone());
            if let Err(e) = self.state.audit.append("policy_activated", &policy.host.key_id, &policy.owner.key_id, now()) {
                tracing::warn!(error = %e, "failed to append audit entry for policy_activated");
            }
        }

        Ok(policy)
    }

    async fn get_active_policy(&self) -> RpcResult<Option<Policy>> {
        Ok(self.state.active_policy.read().await.clone())
    }

    // ── Schedule ──────────────────────────────────────────────────────────

    async fn get_schedule(&self) -> RpcResult<String> {
        Ok(self.state.scheduler.spec_raw().await)
    }

    async fn update_schedule(&self, spec: String) -> RpcResult<String> {
        let parsed = ScheduleSpec::parse(&spec).map_err(|e| bad_input(e.to_string()))?;
        let retry = qvault_schedule::RetryStrategy::default();
        self.state.scheduler.update_schedule(parsed, spec.clone(), retry).await;
        Ok(spec)
    }

    async fn get_backup_history(&self) -> RpcResult<Vec<BackupResult>> {
        Ok(self.state.scheduler.history().await)
    }

    async fn trigger_backup_now(&self) -> RpcResult<BackupResult> {
        Ok(self
            .state
            .scheduler
            .run_now(&self.state.backup_fn, &self.state.schedule_callbacks)
            .await)
    }

    // ── Tickets and challenges ───────────────────────────────────────────

    async fn issue_deletion_ticket(&self, target: qvault_tickets::TicketTarget, reason: String, expires_at: i64) -> RpcResult<DeletionTicket> {
        let id = random_id();
        let mut ticket = DeletionTicket::new(id, target, reason, now(), expires_at, self.state.owner_kp.key_holder_id.to_hex());
        ticket.sign(&self.state.owner_kp).map_err(|e| internal(e.to_string()))?;

        self.state
            .ticket_store
            .save(&ticket.id, &ticket)
            .map_err(|e| internal(e.to_string()))?;
        self.state
            .ledger
            .write()
            .await
            .register(ticket.clone(), &self.state.owner_kp.public_hex())
            .map_err(|e| internal(e.to_string()))?;

        if let Err(e) = self.state.audit.append("issue_deletion_ticket", &ticket.id, &ticket.issuer_key_id, now()) {
            tracing::warn!(error = %e, "failed to append audit entry for issue_deletion_ticket");
        }
        Ok(ticket)
    }

    async fn create_challenge(&self, blob_ids: Vec<String>, expires_at: i64) -> RpcResult<Challenge> {
        use rand::RngCore;
        let items = blob_ids
            .into_iter()
            .map(|blob_id| {
                let mut nonce = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut nonce);
                ChallengeItem {
                    blob_id,
                    nonce: hex::encode(nonce),
                }
            })
            .collect();

        let mut challenge = Challenge::new(random_id(), items, expires_at);
        challenge.sign(&self.state.owner_kp).map_err(|e| internal(e.to_string()))?;
        self.state.challenges.write().await.insert(challenge.id.clone(), challenge.clone());
        Ok(challenge)
    }

    async fn verify_challenge_response(&self, request: RpcVerifyChallenge) -> RpcResult<bool> {
        let known = self.state.challenges.read().await.get(&request.challenge.id).cloned();
        let challenge = known.unwrap_or(request.challenge);

        let contents_hex = request.contents_hex;
        let result = verify_response(&challenge, &request.response, &request.host_public_key, now(), |blob_id| {
            contents_hex.get(blob_id).and_then(|h| hex::decode(h).ok())
        });

        match result {
            Ok(()) => Ok(true),
            Err(e) if matches!(
                e,
                qvault_tickets::TicketError::DigestMismatch(_)
                    | qvault_tickets::TicketError::MissingBlob(_)
                    | qvault_tickets::TicketError::ChallengeExpired(_)
            ) => Ok(false),
            Err(e) => Err(internal(e.to_string())),
        }
    }

    // ── Audit ─────────────────────────────────────────────────────────────

    async fn get_audit_entries(&self, limit: usize, offset: usize, op_filter: Option<String>) -> RpcResult<Vec<AuditEntry>> {
        Ok(self.state.audit.get_entries(limit, offset, op_filter.as_deref()))
    }

    async fn verify_audit_chain(&self) -> RpcResult<VerifyResult> {
        Ok(self.state.audit.verify())
    }

    async fn export_audit_chain(&self) -> RpcResult<String> {
        let bytes = self.state.audit.export().map_err(|e| internal(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| internal(e.to_string()))
    }

    // ── Integrity ─────────────────────────────────────────────────────────

    async fn get_integrity_config(&self) -> RpcResult<VerificationConfig> {
        Ok(self.state.checker.config().await)
    }

    async fn update_integrity_config(&self, config: VerificationConfig) -> RpcResult<()> {
        self.state.checker.update_config(config).await.map_err(|e| bad_input(e.to_string()))
    }

    async fn get_integrity_status(&self) -> RpcResult<CheckerStatus> {
        Ok(self.state.checker.status().await)
    }

    async fn run_integrity_check_now(&self) -> RpcResult<CheckOutcome> {
        self.state
            .checker
            .run_now(&self.state.alert_sink)
            .await
            .map_err(|e| internal(e.to_string()))
    }
}
