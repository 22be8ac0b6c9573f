//! qvault-host — the storage host daemon.
//!
//! Serves the content-addressed blob API (`qvault_storage::router`) over
//! HTTP and enforces the active two-party policy on every write and
//! delete. Unlike `qvault-node`, the host has no owner secrets: its own
//! identity is a local keypair generated on first run, used only to
//! counter-sign the storage policy and to appear as the `host` party in
//! its `Identity`.
//!
//! Startup sequence:
//!   1. Load or generate the host's own keypair
//!   2. Open the audit chain
//!   3. Optionally wire a read-only consent manager (needed to authorize
//!      deletes under `DeletionMode::BothRequired`)
//!   4. Open the storage guard over the blob directory
//!   5. Load the active policy, counter-signing it as host if the owner
//!      has signed but the host has not yet
//!   6. Preload any deletion tickets already issued to this host
//!   7. Serve the blob HTTP API until interrupted

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use qvault_audit::Chain;
use qvault_consensus::{ConsentManager, StoredVaultConfig, VaultConfig};
use qvault_core::raw::restrict_secret_file;
use qvault_core::FileStore;
use qvault_crypto::KeyPair;
use qvault_policy::{Policy, StoredPolicy};
use qvault_storage::StorageGuard;
use qvault_tickets::DeletionTicket;

#[derive(Parser, Debug)]
#[command(
    name = "qvault-host",
    version,
    about = "qvault storage host daemon — policy-enforced blob storage over HTTP"
)]
struct Args {
    /// Directory holding the host's persistent state (hostkey, blob data,
    /// audit.jsonl, policy.json).
    #[arg(long, default_value = "~/.qvault/host")]
    data_dir: PathBuf,

    /// HTTP listen address for the blob API.
    #[arg(long, default_value = "0.0.0.0:9955")]
    listen_addr: SocketAddr,

    /// Total bytes this host will store before rejecting further writes.
    #[arg(long, default_value_t = 10 * 1024 * 1024 * 1024)]
    quota_bytes: u64,

    /// Path to a host-readable copy of the vault's key-holder registry
    /// (no owner secrets — just enough for this host to check deletion
    /// request approval status under `both-required` mode). Omit to run
    /// without consent visibility, in which case `both-required` deletes
    /// are always rejected.
    #[arg(long)]
    vault_view: Option<PathBuf>,

    /// Directory the owner's consent requests are written to, shared with
    /// this host out of band (e.g. a synced or mounted path). Defaults to
    /// `<data_dir>/requests`. Only consulted when `--vault-view` is set.
    #[arg(long)]
    requests_dir: Option<PathBuf>,

    /// Path to the policy document jointly agreed with the owner. If it
    /// carries the owner's signature but not this host's, the host signs
    /// it on startup and writes the result back to this path.
    #[arg(long)]
    policy_file: Option<PathBuf>,

    /// Directory of deletion tickets issued to this host, preloaded into
    /// the storage guard's ticket ledger at startup.
    #[arg(long)]
    ticket_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,qvault=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("qvault host starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let host_kp = load_or_generate_host_key(&data_dir.join("host.key")).context("loading host identity")?;
    info!(key_holder_id = %host_kp.key_holder_id, public_key = %host_kp.public_hex(), "host identity ready");

    let audit = Arc::new(Chain::open(data_dir.join("audit.jsonl")).context("opening audit chain")?);

    // ── Optional consent visibility, for `both-required` deletion mode ────────
    let vault: Option<VaultConfig> = match &args.vault_view {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading vault view {}", path.display()))?;
            let stored: StoredVaultConfig = serde_json::from_str(&json).context("parsing vault view")?;
            Some(stored.head)
        }
        None => None,
    };
    let consent = match &vault {
        Some(vault) => {
            let requests_dir = args.requests_dir.clone().unwrap_or_else(|| data_dir.join("requests"));
            let manager = ConsentManager::open(vault.clone(), &requests_dir).context("opening read-only consent manager")?;
            info!("both-required deletion mode is available (consent manager wired)");
            Some(Arc::new(manager))
        }
        None => {
            warn!("no --vault-view given: both-required deletes will be rejected");
            None
        }
    };

    // ── Storage guard ──────────────────────────────────────────────────────────
    let guard = Arc::new(
        StorageGuard::open(data_dir.join("repo"), args.quota_bytes, Arc::clone(&audit), consent)
            .context("opening storage guard")?,
    );
    info!(used_bytes = guard.used_bytes(), quota_bytes = guard.quota_bytes(), "storage guard ready");

    // ── Policy ─────────────────────────────────────────────────────────────────
    if let Some(policy_path) = &args.policy_file {
        let policy = load_or_countersign_policy(policy_path, &host_kp).context("loading storage policy")?;
        info!(deletion_mode = ?policy.deletion_mode, retention_days = policy.retention_days, "policy active");
        guard.set_policy(policy);
    } else {
        warn!("no --policy-file given: all writes and deletes will be rejected until one is set");
    }

    // ── Ticket ledger ──────────────────────────────────────────────────────────
    if let Some(ticket_dir) = &args.ticket_dir {
        let loaded = preload_tickets(ticket_dir, vault.as_ref(), &guard).context("preloading deletion tickets")?;
        info!(count = loaded, "deletion tickets preloaded");
    }

    // ── HTTP server ────────────────────────────────────────────────────────────
    let app = qvault_storage::router(Arc::clone(&guard));
    let listener = tokio::net::TcpListener::bind(args.listen_addr)
        .await
        .with_context(|| format!("binding {}", args.listen_addr))?;
    info!(addr = %args.listen_addr, "host ready, serving blob API");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("blob API server exited")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

/// Loads the host's keypair from `path`, or generates and persists a new
/// one on first run. The secret never leaves this file; only the public
/// key and key-holder id are ever logged or handed to the owner.
fn load_or_generate_host_key(path: &Path) -> anyhow::Result<KeyPair> {
    if path.exists() {
        let hex_secret = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let bytes = hex::decode(hex_secret.trim()).context("decoding host secret key")?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("host secret key must be 32 bytes"))?;
        return Ok(KeyPair::from_raw(&arr));
    }

    let kp = KeyPair::generate();
    std::fs::write(path, kp.secret_hex()).with_context(|| format!("writing {}", path.display()))?;
    restrict_secret_file(path).context("restricting host key file permissions")?;
    warn!(
        public_key = %kp.public_hex(),
        "generated a new host identity; share this public key with the vault owner so it can be added to the policy"
    );
    Ok(kp)
}

/// Reads a policy document from `path`. If the owner has signed it but
/// this host has not, signs it as host and writes the fully-signed
/// document back so a restart doesn't re-prompt for the same signature.
fn load_or_countersign_policy(path: &Path, host_kp: &KeyPair) -> anyhow::Result<Policy> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading policy file {}", path.display()))?;
    let mut stored: StoredPolicy = serde_json::from_str(&json).context("parsing policy file")?;

    if stored.host_signature.is_none() {
        if stored.owner_signature.is_none() {
            anyhow::bail!("policy at {} has no owner signature yet; ask the owner to sign it first", path.display());
        }
        stored.head.sign_as_host(host_kp).context("countersigning policy as host")?;
        let rewritten = serde_json::to_string_pretty(&stored).context("serializing countersigned policy")?;
        std::fs::write(path, rewritten).with_context(|| format!("writing countersigned policy to {}", path.display()))?;
        info!("countersigned policy as host");
    }

    stored.head.verify().context("policy failed signature verification")?;
    Ok(stored.head)
}

/// Loads every ticket persisted under `ticket_dir` into the guard's ticket
/// ledger, resolving each ticket's issuer public key from the vault view's
/// registered key-holders (the owner or a delegated key-holder). Tickets
/// whose issuer cannot be resolved are skipped with a warning rather than
/// failing the whole startup.
fn preload_tickets(ticket_dir: &Path, vault: Option<&VaultConfig>, guard: &StorageGuard) -> anyhow::Result<usize> {
    let store = FileStore::open(ticket_dir.to_path_buf()).with_context(|| format!("opening ticket store {}", ticket_dir.display()))?;
    let vault = match vault {
        Some(v) => v,
        None => {
            warn!("no --vault-view given: skipping ticket preload since issuer keys cannot be resolved");
            return Ok(0);
        }
    };

    let mut loaded = 0usize;
    for (id, ticket) in store.load_all::<DeletionTicket>()? {
        let issuer = vault.key_holders.iter().find(|h| h.id.to_hex() == ticket.issuer_key_id);
        match issuer {
            Some(holder) => match guard.register_ticket(ticket, &holder.public_key) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(ticket_id = %id, error = %e, "rejected ticket at startup"),
            },
            None => warn!(ticket_id = %id, issuer = %ticket.issuer_key_id, "unknown ticket issuer, skipping"),
        }
    }
    Ok(loaded)
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
