//! qvault-cli
//!
//! Human-facing control plane for qvault: generates key-holder identities,
//! initializes a vault's local configuration, and drives a running
//! `qvault-node` over JSON-RPC to register key-holders, raise and sign
//! restore/deletion requests, agree a storage policy, manage the backup
//! schedule, issue deletion tickets and possession challenges, and inspect
//! the audit chain and integrity checker.
//!
//! Usage:
//!   qvault-cli keygen                  [--keyfile <path>]
//!   qvault-cli init                    --owner-name <n> --repo-url <url> -k <k> -n <n>
//!   qvault-cli vault info
//!   qvault-cli vault register-key-holder --name <n> --public-key <hex> [--owner]
//!   qvault-cli restore request         --requester <n> --snapshot-id <id> --reason <r>
//!   qvault-cli restore sign            --id <id> --keyfile <path>
//!   qvault-cli deletion request        --requester <n> --deletion-type snapshot --reason <r>
//!   qvault-cli policy create           ... ; qvault-cli policy sign-owner --policy-file <path>

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use qvault_consensus::{ConsentMode, DeletionType, KeyHolder, StoredVaultConfig, VaultConfig};
use qvault_core::raw::restrict_secret_file;
use qvault_core::types::now;
use qvault_crypto::signing::{sign_deletion_request, sign_restore_request, DeletionRequestPayload, RestoreRequestPayload};
use qvault_crypto::KeyPair;
use qvault_policy::{DeletionMode, Policy, StoredPolicy};
use qvault_rpc::{RpcCreateDeletionRequest, RpcCreatePolicy, RpcRegisterKeyHolder};
use qvault_tickets::TicketTarget;

mod rpc_client;
use rpc_client::NodeRpcClient;

#[derive(Parser, Debug)]
#[command(name = "qvault-cli", version, about = "qvault control-plane CLI")]
struct Args {
    /// Running qvault-node's JSON-RPC endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:9944")]
    node_rpc: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 key-holder identity and save it to a keyfile.
    Keygen {
        #[arg(long, default_value = "~/.qvault/keys/default.key")]
        keyfile: PathBuf,
    },

    /// Create a brand-new vault's local configuration (owner identity,
    /// threshold, consent mode). Writes vault.json that `qvault-node`
    /// reads at startup; does not talk to a running node.
    Init {
        #[arg(long)]
        owner_name: String,
        #[arg(long)]
        repo_url: String,
        /// Approvals required out of `total_n` key-holders.
        #[arg(long, short = 'k')]
        threshold_k: u8,
        /// Total key-holders the vault will ever register.
        #[arg(long, short = 'n')]
        total_n: u8,
        /// Require a signed consensus request before any restore, even for
        /// the owner's own key.
        #[arg(long, default_value_t = true)]
        require_approval: bool,
        /// Use the legacy 2-of-2 raw-share-release consent mode instead of
        /// signature-threshold consensus.
        #[arg(long)]
        legacy_share_release: bool,
        /// Where to write vault.json (the node's --data-dir).
        #[arg(long, default_value = "~/.qvault/node")]
        data_dir: PathBuf,
        /// Owner's keyfile; generated if it doesn't already exist.
        #[arg(long, default_value = "~/.qvault/keys/owner.key")]
        owner_keyfile: PathBuf,
    },

    #[command(subcommand)]
    Vault(VaultCmd),
    #[command(subcommand)]
    Restore(RestoreCmd),
    #[command(subcommand)]
    Deletion(DeletionCmd),
    #[command(subcommand)]
    Policy(PolicyCmd),
    #[command(subcommand)]
    Schedule(ScheduleCmd),
    #[command(subcommand)]
    Ticket(TicketCmd),
    #[command(subcommand)]
    Challenge(ChallengeCmd),
    #[command(subcommand)]
    Audit(AuditCmd),
    #[command(subcommand)]
    Integrity(IntegrityCmd),
}

#[derive(Subcommand, Debug)]
enum VaultCmd {
    /// Print the vault's sanitized configuration (no secrets).
    Info,
    /// Register a new key-holder with the running node.
    RegisterKeyHolder {
        #[arg(long)]
        name: String,
        /// Hex-encoded Ed25519 public key. Generate one with `qvault-cli keygen`.
        #[arg(long)]
        public_key: String,
        #[arg(long)]
        network_address: Option<String>,
        #[arg(long)]
        is_owner: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RestoreCmd {
    /// Open a new restore request.
    Request {
        #[arg(long)]
        requester: String,
        #[arg(long)]
        snapshot_id: String,
        #[arg(long, value_delimiter = ',')]
        paths: Vec<String>,
        #[arg(long)]
        reason: String,
    },
    /// Fetch one restore request by id.
    Get { id: String },
    /// List all restore requests.
    List,
    /// Sign a pending restore request with a key-holder identity.
    Sign {
        #[arg(long)]
        id: String,
        #[arg(long)]
        keyfile: PathBuf,
    },
    /// Legacy 2-of-2 mode: approve by releasing a raw Shamir share.
    ApproveWithShare {
        #[arg(long)]
        id: String,
        #[arg(long)]
        keyfile: PathBuf,
        #[arg(long)]
        index: u8,
        #[arg(long)]
        data_hex: String,
    },
    /// Deny a pending restore request.
    Deny { id: String },
}

#[derive(Subcommand, Debug)]
enum DeletionCmd {
    /// Open a new deletion request.
    Request {
        #[arg(long)]
        requester: String,
        #[arg(long, value_enum)]
        deletion_type: CliDeletionType,
        #[arg(long, value_delimiter = ',')]
        snapshot_ids: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        paths: Vec<String>,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        required_approvals: Option<u32>,
    },
    /// Fetch one deletion request by id.
    Get { id: String },
    /// List all deletion requests.
    List,
    /// Sign a pending deletion request with a key-holder identity.
    Sign {
        #[arg(long)]
        id: String,
        #[arg(long)]
        keyfile: PathBuf,
    },
    /// Deny a pending deletion request.
    Deny { id: String },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliDeletionType {
    Snapshot,
    Path,
    Prune,
    All,
}

impl From<CliDeletionType> for DeletionType {
    fn from(t: CliDeletionType) -> Self {
        match t {
            CliDeletionType::Snapshot => DeletionType::Snapshot,
            CliDeletionType::Path => DeletionType::Path,
            CliDeletionType::Prune => DeletionType::Prune,
            CliDeletionType::All => DeletionType::All,
        }
    }
}

#[derive(Subcommand, Debug)]
enum PolicyCmd {
    /// Draft a new two-party storage policy and ask the node to sign it as
    /// owner. Writes the (owner-signed, host-unsigned) result to a file the
    /// storage host can countersign.
    Create {
        #[arg(long)]
        owner_name: String,
        #[arg(long)]
        owner_key_id: String,
        #[arg(long)]
        owner_public_key: String,
        #[arg(long)]
        host_name: String,
        #[arg(long)]
        host_key_id: String,
        #[arg(long)]
        host_public_key: String,
        #[arg(long)]
        retention_days: u32,
        #[arg(long)]
        deletion_mode: DeletionMode,
        #[arg(long)]
        max_storage_bytes: u64,
        #[arg(long)]
        valid_until: Option<i64>,
        #[arg(long, default_value = "policy.json")]
        out_file: PathBuf,
    },
    /// Sign an existing draft policy file as owner and overwrite it with
    /// the result.
    SignOwner {
        #[arg(long)]
        policy_file: PathBuf,
    },
    /// Print the node's currently active policy, if any.
    GetActive,
}

#[derive(Subcommand, Debug)]
enum ScheduleCmd {
    Get,
    Update { spec: String },
    History,
    TriggerNow,
}

#[derive(Subcommand, Debug)]
enum TicketCmd {
    /// Issue a ticket authorizing deletion of one snapshot.
    IssueSnapshot {
        #[arg(long)]
        snapshot_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        expires_at: i64,
    },
    /// Issue a ticket authorizing deletion of one path.
    IssuePath {
        #[arg(long)]
        path: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        expires_at: i64,
    },
    /// Issue a ticket authorizing pruning everything before a cutoff.
    IssuePrune {
        #[arg(long)]
        prune_cutoff: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        expires_at: i64,
    },
}

#[derive(Subcommand, Debug)]
enum ChallengeCmd {
    /// Ask the node to issue a possession challenge for a set of blobs.
    Create {
        #[arg(long, value_delimiter = ',')]
        blob_ids: Vec<String>,
        #[arg(long)]
        expires_at: i64,
    },
}

#[derive(Subcommand, Debug)]
enum AuditCmd {
    Entries {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        op_filter: Option<String>,
    },
    Verify,
    Export,
}

#[derive(Subcommand, Debug)]
enum IntegrityCmd {
    Status,
    RunNow,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn,qvault_cli=info").init();

    let args = Args::parse();
    let client = NodeRpcClient::new(&args.node_rpc);

    match args.command {
        Command::Keygen { keyfile } => cmd_keygen(&expand_tilde(&keyfile)),

        Command::Init {
            owner_name,
            repo_url,
            threshold_k,
            total_n,
            require_approval,
            legacy_share_release,
            data_dir,
            owner_keyfile,
        } => cmd_init(
            owner_name,
            repo_url,
            threshold_k,
            total_n,
            require_approval,
            legacy_share_release,
            &expand_tilde(&data_dir),
            &expand_tilde(&owner_keyfile),
        ),

        Command::Vault(cmd) => cmd_vault(cmd, &client).await,
        Command::Restore(cmd) => cmd_restore(cmd, &client).await,
        Command::Deletion(cmd) => cmd_deletion(cmd, &client).await,
        Command::Policy(cmd) => cmd_policy(cmd, &client).await,
        Command::Schedule(cmd) => cmd_schedule(cmd, &client).await,
        Command::Ticket(cmd) => cmd_ticket(cmd, &client).await,
        Command::Challenge(cmd) => cmd_challenge(cmd, &client).await,
        Command::Audit(cmd) => cmd_audit(cmd, &client).await,
        Command::Integrity(cmd) => cmd_integrity(cmd, &client).await,
    }
}

// ── Keygen / Init ────────────────────────────────────────────────────────────

fn cmd_keygen(keyfile: &Path) -> anyhow::Result<()> {
    if keyfile.exists() {
        anyhow::bail!("keyfile {} already exists; delete it first to generate a new key", keyfile.display());
    }
    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kp = KeyPair::generate();
    std::fs::write(keyfile, kp.secret_hex()).with_context(|| format!("writing {}", keyfile.display()))?;
    restrict_secret_file(keyfile).context("restricting keyfile permissions")?;

    println!("Generated new key-holder identity.");
    println!("Key-holder id: {}", kp.key_holder_id);
    println!("Public key:    {}", kp.public_hex());
    println!("Keyfile:       {}", keyfile.display());
    println!("\nBACK UP THIS KEYFILE. Loss means this key-holder can no longer sign anything.");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_init(
    owner_name: String,
    repo_url: String,
    threshold_k: u8,
    total_n: u8,
    require_approval: bool,
    legacy_share_release: bool,
    data_dir: &Path,
    owner_keyfile: &Path,
) -> anyhow::Result<()> {
    let vault_path = data_dir.join("vault.json");
    if vault_path.exists() {
        anyhow::bail!("vault config already exists at {}", vault_path.display());
    }
    std::fs::create_dir_all(data_dir).with_context(|| format!("creating {}", data_dir.display()))?;

    let owner_kp = load_or_generate_keypair(owner_keyfile).context("loading owner identity")?;

    let mut rand_bytes = [0u8; 32];
    use rand::RngCore;
    rand::rngs::OsRng.fill_bytes(&mut rand_bytes);
    let repo_password_hex = hex::encode(rand_bytes);

    let consent_mode = if legacy_share_release {
        ConsentMode::LegacyShareRelease
    } else {
        ConsentMode::SignatureConsensus
    };

    let mut vault = VaultConfig::new(
        owner_name.clone(),
        repo_url,
        owner_kp.secret_hex(),
        repo_password_hex,
        threshold_k,
        total_n,
        require_approval,
        consent_mode,
    )
    .map_err(|e| anyhow::anyhow!("invalid vault parameters: {e}"))?;

    let owner_holder = KeyHolder::new(owner_name, owner_kp.public_hex(), None, now(), true).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    vault.register_key_holder(owner_holder).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let stored = StoredVaultConfig::new(vault);
    let json = serde_json::to_string_pretty(&stored).context("serializing vault config")?;
    std::fs::write(&vault_path, json).with_context(|| format!("writing {}", vault_path.display()))?;
    restrict_secret_file(&vault_path).context("restricting vault config permissions")?;

    println!("Vault initialized.");
    println!("Owner key-holder id: {}", owner_kp.key_holder_id);
    println!("Owner public key:    {}", owner_kp.public_hex());
    println!("Config written to:   {}", vault_path.display());
    println!("\nStart the node with: qvault-node --data-dir {}", data_dir.display());
    Ok(())
}

fn load_or_generate_keypair(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let hex_secret = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let bytes = hex::decode(hex_secret.trim()).context("decoding secret key")?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("secret key must be 32 bytes"))?;
        return Ok(KeyPair::from_raw(&arr));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kp = KeyPair::generate();
    std::fs::write(path, kp.secret_hex()).with_context(|| format!("writing {}", path.display()))?;
    restrict_secret_file(path).context("restricting keyfile permissions")?;
    info!(keyfile = %path.display(), "generated new keypair");
    Ok(kp)
}

// ── Vault ─────────────────────────────────────────────────────────────────────

async fn cmd_vault(cmd: VaultCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        VaultCmd::Info => {
            let info = client.get_vault().await?;
            println!("Owner:            {}", info.owner_name);
            println!("Repo URL:         {}", info.repo_url);
            println!("Threshold:        {} of {}", info.threshold_k, info.total_n);
            println!("Require approval: {}", info.require_approval);
            println!("Consent mode:     {:?}", info.consent_mode);
            println!("Key-holders:");
            for h in &info.key_holders {
                println!("  {}  {}{}", h.id, h.name, if h.is_owner { " (owner)" } else { "" });
            }
            Ok(())
        }
        VaultCmd::RegisterKeyHolder { name, public_key, network_address, is_owner } => {
            let info = client
                .register_key_holder(RpcRegisterKeyHolder {
                    name,
                    public_key,
                    network_address,
                    is_owner,
                    joined_at: now(),
                })
                .await?;
            println!("Key-holder registered. Vault now has {} of {} holders.", info.key_holders.len(), info.total_n);
            Ok(())
        }
    }
}

// ── Restore ───────────────────────────────────────────────────────────────────

async fn cmd_restore(cmd: RestoreCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        RestoreCmd::Request { requester, snapshot_id, paths, reason } => {
            let req = client.create_restore_request(&requester, &snapshot_id, paths, &reason).await?;
            println!("Restore request created: {}", req.id);
            println!("Status: {:?}  (needs {} approvals)", req.status, req.required_approvals);
            Ok(())
        }
        RestoreCmd::Get { id } => {
            match client.get_restore_request(&id).await? {
                Some(req) => print_restore_request(&req),
                None => println!("No restore request with id {id}"),
            }
            Ok(())
        }
        RestoreCmd::List => {
            for req in client.list_restore_requests().await? {
                print_restore_request(&req);
                println!();
            }
            Ok(())
        }
        RestoreCmd::Sign { id, keyfile } => {
            let kp = load_or_generate_keypair(&expand_tilde(&keyfile))?;
            let req = client
                .get_restore_request(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no restore request with id {id}"))?;
            let payload = RestoreRequestPayload {
                id: &req.id,
                requester: &req.requester,
                snapshot_id: &req.snapshot_id,
                reason: &req.reason,
                key_holder_id: &kp.key_holder_id.to_hex(),
                paths: &req.paths,
                created_at: req.created_at,
            };
            let signature = sign_restore_request(&kp, &payload).context("signing restore request")?;
            let updated = client.sign_restore_request(&id, &kp.key_holder_id.to_hex(), &signature).await?;
            println!("Signed. Status: {:?} ({}/{} approvals)", updated.status, updated.approvals.len(), updated.required_approvals);
            Ok(())
        }
        RestoreCmd::ApproveWithShare { id, keyfile, index, data_hex } => {
            let kp = load_or_generate_keypair(&expand_tilde(&keyfile))?;
            let updated = client.approve_restore_with_share(&id, &kp.key_holder_id.to_hex(), index, &data_hex).await?;
            println!("Share recorded. Status: {:?}", updated.status);
            Ok(())
        }
        RestoreCmd::Deny { id } => {
            let updated = client.deny_restore_request(&id).await?;
            println!("Status: {:?}", updated.status);
            Ok(())
        }
    }
}

fn print_restore_request(req: &qvault_consensus::RestoreRequest) {
    println!("Restore request {}", req.id);
    println!("  requester:  {}", req.requester);
    println!("  snapshot:   {}", req.snapshot_id);
    println!("  status:     {:?}", req.status);
    println!("  approvals:  {}/{}", req.approvals.len(), req.required_approvals);
}

// ── Deletion ──────────────────────────────────────────────────────────────────

async fn cmd_deletion(cmd: DeletionCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        DeletionCmd::Request { requester, deletion_type, snapshot_ids, paths, reason, required_approvals } => {
            let req = client
                .create_deletion_request(RpcCreateDeletionRequest {
                    requester,
                    deletion_type: deletion_type.into(),
                    snapshot_ids,
                    paths,
                    reason,
                    required_approvals,
                })
                .await?;
            println!("Deletion request created: {}", req.id);
            println!("Status: {:?}  (needs {} approvals)", req.status, req.required_approvals);
            Ok(())
        }
        DeletionCmd::Get { id } => {
            match client.get_deletion_request(&id).await? {
                Some(req) => print_deletion_request(&req),
                None => println!("No deletion request with id {id}"),
            }
            Ok(())
        }
        DeletionCmd::List => {
            for req in client.list_deletion_requests().await? {
                print_deletion_request(&req);
                println!();
            }
            Ok(())
        }
        DeletionCmd::Sign { id, keyfile } => {
            let kp = load_or_generate_keypair(&expand_tilde(&keyfile))?;
            let req = client
                .get_deletion_request(&id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no deletion request with id {id}"))?;
            let deletion_type_str = match req.deletion_type {
                DeletionType::Snapshot => "snapshot",
                DeletionType::Path => "path",
                DeletionType::Prune => "prune",
                DeletionType::All => "all",
            };
            let payload = DeletionRequestPayload {
                id: &req.id,
                requester: &req.requester,
                deletion_type: deletion_type_str,
                snapshot_ids: &req.snapshot_ids,
                paths: &req.paths,
                reason: &req.reason,
                key_holder_id: &kp.key_holder_id.to_hex(),
                created_at: req.created_at,
            };
            let signature = sign_deletion_request(&kp, &payload).context("signing deletion request")?;
            let updated = client.sign_deletion_request(&id, &kp.key_holder_id.to_hex(), &signature).await?;
            println!("Signed. Status: {:?} ({}/{} approvals)", updated.status, updated.approvals.len(), updated.required_approvals);
            Ok(())
        }
        DeletionCmd::Deny { id } => {
            let updated = client.deny_deletion_request(&id).await?;
            println!("Status: {:?}", updated.status);
            Ok(())
        }
    }
}

fn print_deletion_request(req: &qvault_consensus::DeletionRequest) {
    println!("Deletion request {}", req.id);
    println!("  requester:  {}", req.requester);
    println!("  type:       {:?}", req.deletion_type);
    println!("  status:     {:?}", req.status);
    println!("  approvals:  {}/{}", req.approvals.len(), req.required_approvals);
}

// ── Policy ────────────────────────────────────────────────────────────────────

async fn cmd_policy(cmd: PolicyCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        PolicyCmd::Create {
            owner_name,
            owner_key_id,
            owner_public_key,
            host_name,
            host_key_id,
            host_public_key,
            retention_days,
            deletion_mode,
            max_storage_bytes,
            valid_until,
            out_file,
        } => {
            let draft = client
                .create_policy(RpcCreatePolicy {
                    owner_name,
                    owner_key_id,
                    owner_public_key,
                    host_name,
                    host_key_id,
                    host_public_key,
                    retention_days,
                    deletion_mode,
                    max_storage_bytes,
                    valid_until,
                })
                .await?;
            let signed_by_owner = client.sign_policy_as_owner(&draft).await?;
            write_policy(&out_file, &signed_by_owner)?;
            println!("Policy drafted and signed by owner. Send {} to the storage host to countersign.", out_file.display());
            Ok(())
        }
        PolicyCmd::SignOwner { policy_file } => {
            let json = std::fs::read_to_string(&policy_file).with_context(|| format!("reading {}", policy_file.display()))?;
            let stored: StoredPolicy = serde_json::from_str(&json).context("parsing policy file")?;
            let signed = client.sign_policy_as_owner(&stored.head).await?;
            write_policy(&policy_file, &signed)?;
            println!("Policy signed by owner (fully signed: {}).", signed.is_fully_signed());
            Ok(())
        }
        PolicyCmd::GetActive => {
            match client.get_active_policy().await? {
                Some(p) => {
                    println!("Active policy:");
                    println!("  owner:         {} ({})", p.owner.name, p.owner.key_id);
                    println!("  host:          {} ({})", p.host.name, p.host.key_id);
                    println!("  retention:     {} days", p.retention_days);
                    println!("  deletion mode: {:?}", p.deletion_mode);
                    println!("  quota:         {} bytes", p.max_storage_bytes);
                }
                None => println!("No active policy."),
            }
            Ok(())
        }
    }
}

fn write_policy(path: &Path, policy: &Policy) -> anyhow::Result<()> {
    let stored = StoredPolicy::new(policy.clone());
    let json = serde_json::to_string_pretty(&stored).context("serializing policy")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

// ── Schedule ──────────────────────────────────────────────────────────────────

async fn cmd_schedule(cmd: ScheduleCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        ScheduleCmd::Get => {
            println!("{}", client.get_schedule().await?);
            Ok(())
        }
        ScheduleCmd::Update { spec } => {
            let applied = client.update_schedule(&spec).await?;
            println!("Schedule updated to: {applied}");
            Ok(())
        }
        ScheduleCmd::History => {
            for result in client.get_backup_history().await? {
                println!("attempt {}: {}", result.attempt, if result.error.is_none() { "ok" } else { "failed" });
                if let Some(err) = &result.error {
                    println!("  error: {err}");
                }
            }
            Ok(())
        }
        ScheduleCmd::TriggerNow => {
            let result = client.trigger_backup_now().await?;
            match &result.error {
                None => println!("Backup succeeded (attempt {}).", result.attempt),
                Some(err) => println!("Backup failed (attempt {}): {}", result.attempt, err),
            }
            Ok(())
        }
    }
}

// ── Tickets ───────────────────────────────────────────────────────────────────

async fn cmd_ticket(cmd: TicketCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    let (target, reason, expires_at) = match cmd {
        TicketCmd::IssueSnapshot { snapshot_id, reason, expires_at } => (TicketTarget::Snapshot { snapshot_id }, reason, expires_at),
        TicketCmd::IssuePath { path, reason, expires_at } => (TicketTarget::Path { path }, reason, expires_at),
        TicketCmd::IssuePrune { prune_cutoff, reason, expires_at } => (TicketTarget::Prune { prune_cutoff }, reason, expires_at),
    };
    let ticket = client.issue_deletion_ticket(target, &reason, expires_at).await?;
    println!("Ticket issued: {}", ticket.id);
    println!("Expires at: {}", ticket.expires_at);
    println!("{}", serde_json::to_string_pretty(&ticket)?);
    Ok(())
}

// ── Challenges ────────────────────────────────────────────────────────────────

async fn cmd_challenge(cmd: ChallengeCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        ChallengeCmd::Create { blob_ids, expires_at } => {
            let challenge = client.create_challenge(blob_ids, expires_at).await?;
            println!("{}", serde_json::to_string_pretty(&challenge)?);
            Ok(())
        }
    }
}

// ── Audit ─────────────────────────────────────────────────────────────────────

async fn cmd_audit(cmd: AuditCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        AuditCmd::Entries { limit, offset, op_filter } => {
            for entry in client.get_audit_entries(limit, offset, op_filter).await? {
                println!("#{} [{}] {} {} by {}", entry.seq, entry.timestamp, entry.operation, entry.subject, entry.actor_key_id);
            }
            Ok(())
        }
        AuditCmd::Verify => {
            let result = client.verify_audit_chain().await?;
            if result.valid {
                println!("Audit chain valid.");
            } else {
                println!("Audit chain BROKEN at sequence {:?}.", result.first_bad_seq);
            }
            Ok(())
        }
        AuditCmd::Export => {
            println!("{}", client.export_audit_chain().await?);
            Ok(())
        }
    }
}

// ── Integrity ─────────────────────────────────────────────────────────────────

async fn cmd_integrity(cmd: IntegrityCmd, client: &NodeRpcClient) -> anyhow::Result<()> {
    match cmd {
        IntegrityCmd::Status => {
            let status = client.get_integrity_status().await?;
            println!("Last check:          {:?}", status.last_check);
            println!("Consecutive failures: {}", status.consecutive_failures);
            Ok(())
        }
        IntegrityCmd::RunNow => {
            let outcome = client.run_integrity_check_now().await?;
            println!("Check passed: {}", outcome.passed());
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
