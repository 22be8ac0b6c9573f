//! qvault-node — the owner/peer control-plane daemon.
//!
//! Startup sequence:
//!   1. Load the vault configuration (written by `qvault-cli init`)
//!   2. Open the consent manager and its request stores
//!   3. Wire the backup scheduler to the external repository tool
//!   4. Wire the scheduled integrity checker
//!   5. Start the JSON-RPC 2.0 server
//!   6. Run until interrupted

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use qvault_audit::Chain;
use qvault_consensus::{ConsentManager, StoredVaultConfig};
use qvault_core::FileStore;
use qvault_crypto::KeyPair;
use qvault_integrity::{AlertSink, NoopAlertSink, ScheduledChecker, VerificationConfig, WebhookAlertSink};
use qvault_repo::{BackupRepo, SubprocessRepo};
use qvault_rpc::server::RpcServerState;
use qvault_rpc::RpcServer;
use qvault_schedule::{BackupFn, BackupFuture, BackupResult, RetryStrategy, ScheduleCallbacks, ScheduleSpec, Scheduler};

#[derive(Parser, Debug)]
#[command(
    name = "qvault-node",
    version,
    about = "qvault owner/peer daemon — consent manager, scheduler, integrity checker, RPC"
)]
struct Args {
    /// Directory holding the vault's persistent state (vault.json, requests/, policy/, tickets/, audit.jsonl).
    #[arg(long, default_value = "~/.qvault/node")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:9944")]
    rpc_addr: SocketAddr,

    /// Repository tool binary driven as a subprocess (e.g. `restic`, `borg`).
    #[arg(long, default_value = "restic")]
    repo_tool: String,

    /// Local filesystem path of the backup repository, used both as the
    /// subprocess tool's `--repo` argument and as the integrity checker's
    /// read target.
    #[arg(long, default_value = "~/.qvault/repo")]
    repo_path: PathBuf,

    /// Paths backed up on each scheduled run (comma-separated).
    #[arg(long, value_delimiter = ',')]
    backup_paths: Vec<String>,

    /// Backup schedule expression (`hourly`, `daily`, `weekly`, `every <dur>`, or cron).
    #[arg(long, default_value = "daily")]
    schedule: String,

    /// Scheduled integrity check interval, in seconds.
    #[arg(long, default_value_t = 24 * 60 * 60)]
    integrity_interval_secs: i64,

    /// Snapshot id the scheduled quick check verifies against. Updated via
    /// `update_integrity_config` as new snapshots are taken.
    #[arg(long, default_value = "")]
    integrity_snapshot_id: String,

    /// Optional webhook URL to POST an alert to on a failed scheduled check.
    #[arg(long)]
    alert_webhook: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,qvault=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("qvault node starting");

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let repo_path = expand_tilde(&args.repo_path);

    // ── Vault configuration ───────────────────────────────────────────────────
    let vault_path = data_dir.join("vault.json");
    let stored: StoredVaultConfig = {
        let json = std::fs::read_to_string(&vault_path).with_context(|| {
            format!(
                "reading vault config at {} — run `qvault-cli init` first",
                vault_path.display()
            )
        })?;
        serde_json::from_str(&json).context("parsing vault config")?
    };
    let vault = stored.head.clone();

    let owner_secret = hex::decode(&vault.owner_private_key_hex).context("decoding owner private key")?;
    let owner_secret: [u8; 32] = owner_secret.try_into().map_err(|_| anyhow::anyhow!("owner private key must be 32 bytes"))?;
    let owner_kp = KeyPair::from_raw(&owner_secret);
    info!(key_holder_id = %owner_kp.key_holder_id, "owner identity loaded");

    // ── Consent manager ───────────────────────────────────────────────────────
    let consent = Arc::new(ConsentManager::open(vault.clone(), &data_dir.join("requests")).context("opening consent manager")?);

    // ── Audit chain ────────────────────────────────────────────────────────────
    // Opened ahead of the backup closure below so a successful backup's
    // verification record can be appended to the same chain as every other
    // owner-side event.
    let audit = Arc::new(Chain::open(data_dir.join("audit.jsonl")).context("opening audit chain")?);

    // ── Verification records produced on every successful backup ─────────────
    // Closes the data-flow loop in spec.md §2: "C3 → external repo tool → C6
    // creates verification record → owner signs → C6 stores". The in-memory
    // `RecordStore` enforces the one-record-per-snapshot invariant; the
    // on-disk `FileStore` makes that durable across restarts.
    let record_file_store = FileStore::open(data_dir.join("verification_records")).context("opening verification record store")?;
    let record_store = Arc::new(tokio::sync::Mutex::new(qvault_integrity::RecordStore::new()));
    for (snapshot_id, record) in record_file_store.load_all::<qvault_integrity::VerificationRecord>()? {
        if let Err(e) = record_store.lock().await.add(record, &owner_kp.public_hex()) {
            warn!(snapshot_id, error = %e, "dropping unverifiable persisted verification record");
        }
    }

    // ── Backup scheduler, wired to the external repository tool ──────────────
    let repo_password = String::from_utf8(hex::decode(&vault.repo_password_hex).context("decoding repo password")?)
        .context("repo password is not valid UTF-8")?;
    let repo: Arc<dyn BackupRepo> = Arc::new(SubprocessRepo::new(args.repo_tool.clone(), repo_path.display().to_string(), repo_password));
    repo.init().await.context("initializing backup repository")?;

    let backup_paths = args.backup_paths.clone();
    let backup_fn: BackupFn = {
        let repo = Arc::clone(&repo);
        // A second keypair reconstructed from the same secret bytes, used
        // only here to sign verification records — the owner identity held
        // by the RPC server below stays a separate, independently-zeroizing
        // `KeyPair` (it has no `Clone`). Wrapped in an `Arc` so each backup
        // tick can cheaply clone a handle into its own future rather than
        // moving the only copy out of this `Fn` closure's environment.
        let record_signing_kp = Arc::new(KeyPair::from_raw(&owner_secret));
        let repo_path_for_records = repo_path.clone();
        let record_store = Arc::clone(&record_store);
        let record_file_store = record_file_store.clone();
        let audit_for_records = Arc::clone(&audit);
        Arc::new(move || {
            let repo = Arc::clone(&repo);
            let paths = backup_paths.clone();
            let repo_path = repo_path_for_records.clone();
            let record_store = Arc::clone(&record_store);
            let record_file_store = record_file_store.clone();
            let audit = Arc::clone(&audit_for_records);
            let record_signing_kp = Arc::clone(&record_signing_kp);
            let owner_public_hex = record_signing_kp.public_hex();
            let owner_key_id = record_signing_kp.key_holder_id;
            Box::pin(async move {
                let snapshot_id = repo.backup(&paths).await.map_err(|e| e.to_string())?;
                info!(%snapshot_id, "backup completed");

                let record_id = {
                    use rand::RngCore;
                    let mut bytes = [0u8; 16];
                    rand::rngs::OsRng.fill_bytes(&mut bytes);
                    hex::encode(bytes)
                };
                match qvault_integrity::create_verification_record(&repo_path, &snapshot_id, record_id, now(), &record_signing_kp) {
                    Ok(record) => {
                        let mut store = record_store.lock().await;
                        match store.add(record.clone(), &owner_public_hex) {
                            Ok(()) => {
                                drop(store);
                                if let Err(e) = record_file_store.save(&snapshot_id, &record) {
                                    warn!(%snapshot_id, error = %e, "failed to persist verification record");
                                }
                                if let Err(e) = audit.append("create_verification_record", &snapshot_id, &owner_key_id.to_hex(), now()) {
                                    warn!(%snapshot_id, error = %e, "failed to append audit entry for verification record");
                                }
                                info!(%snapshot_id, "verification record created and signed");
                            }
                            Err(e) => warn!(%snapshot_id, error = %e, "verification record rejected"),
                        }
                    }
                    Err(e) => warn!(%snapshot_id, error = %e, "failed to build verification record for new snapshot"),
                }

                Ok(())
            }) as BackupFuture
        })
    };

    let schedule_spec = ScheduleSpec::parse(&args.schedule).context("parsing --schedule")?;
    let schedule_callbacks: Arc<dyn ScheduleCallbacks> = Arc::new(LoggingScheduleCallbacks);
    let scheduler = Arc::new(Scheduler::new(schedule_spec, args.schedule.clone(), RetryStrategy::default()));
    let _scheduler_handle = Arc::clone(&scheduler).spawn(Arc::clone(&backup_fn), Arc::clone(&schedule_callbacks));

    // ── Scheduled integrity checker ───────────────────────────────────────────
    let alert_sink: Arc<dyn AlertSink> = match &args.alert_webhook {
        Some(url) => Arc::new(WebhookAlertSink::new(url.clone())),
        None => Arc::new(NoopAlertSink),
    };
    let integrity_config = VerificationConfig {
        enabled: true,
        interval_secs: args.integrity_interval_secs,
        check_type: qvault_integrity::CheckType::Quick,
        repo: repo_path.clone(),
        snapshot_id: args.integrity_snapshot_id.clone(),
        alert_on_corruption: true,
        alert_webhook: args.alert_webhook.clone(),
        expected_config_hash: String::new(),
        expected_data_file_count: 0,
    };
    integrity_config.validate().context("validating integrity config")?;
    let checker = Arc::new(ScheduledChecker::new(integrity_config));
    let _checker_handle = Arc::clone(&checker).spawn(Arc::clone(&alert_sink));

    // ── Policy/ticket stores ───────────────────────────────────────────────────
    // `audit` itself was opened earlier, ahead of the backup closure, so both
    // it and the RPC server below share the same `Chain` instance rather than
    // each maintaining an independent (and mutually corrupting) writer over
    // the same file.
    let policy_store = FileStore::open(data_dir.join("policy")).context("opening policy store")?;
    let ticket_store = FileStore::open(data_dir.join("tickets")).context("opening ticket store")?;

    // ── RPC server ─────────────────────────────────────────────────────────────
    let rpc_state = Arc::new(
        RpcServerState::open(
            Arc::clone(&consent),
            owner_kp,
            policy_store,
            ticket_store,
            audit,
            Arc::clone(&scheduler),
            Arc::clone(&backup_fn),
            Arc::clone(&schedule_callbacks),
            Arc::clone(&checker),
            Arc::clone(&alert_sink),
        )
        .context("opening RPC server state")?,
    );
    let _rpc_handle = RpcServer::new(rpc_state).start(args.rpc_addr).await.context("starting RPC server")?;

    info!("node ready");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    scheduler.stop();
    checker.stop();

    Ok(())
}

/// Logs each lifecycle event at the level its outcome deserves; the node
/// has no other observer of scheduled backups besides whatever is tailing
/// its logs and the RPC-exposed run history.
struct LoggingScheduleCallbacks;

#[async_trait::async_trait]
impl ScheduleCallbacks for LoggingScheduleCallbacks {
    async fn on_start(&self, scheduled_time: qvault_core::types::Timestamp) {
        info!(scheduled_time, "scheduled backup starting");
    }

    async fn on_success(&self, result: &BackupResult) {
        info!(attempt = result.attempt, "scheduled backup succeeded");
    }

    async fn on_failure(&self, result: &BackupResult) {
        warn!(attempt = result.attempt, error = ?result.error, "scheduled backup attempt failed, will retry");
    }

    async fn on_retry_exhausted(&self, result: &BackupResult) {
        warn!(attempt = result.attempt, error = ?result.error, "scheduled backup exhausted retries");
    }

    async fn on_schedule_change(&self, new_spec: &str) {
        info!(schedule = %new_spec, "backup schedule updated");
    }
}

fn now() -> qvault_core::types::Timestamp {
    qvault_core::types::now()
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
