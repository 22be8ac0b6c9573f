//! Scheduled integrity checker (§4.6 "Scheduled variant"): a managed worker
//! task that runs `quick_check` or `check_data_integrity` on a timer and
//! dispatches an alert on corruption.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};

use qvault_core::constants::{INTEGRITY_MAX_INTERVAL_SECS, INTEGRITY_MIN_INTERVAL_SECS};
use qvault_core::types::Timestamp;

use crate::check::{check_data_integrity, quick_check, DataIntegrityReport, QuickCheckReport};
use crate::error::IntegrityError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Quick,
    Full,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub interval_secs: i64,
    pub check_type: CheckType,
    pub repo: PathBuf,
    pub snapshot_id: String,
    pub alert_on_corruption: bool,
    pub alert_webhook: Option<String>,
    /// Only consulted for `CheckType::Quick`; ignored for `Full`.
    #[serde(default)]
    pub expected_config_hash: String,
    #[serde(default)]
    pub expected_data_file_count: u64,
}

impl VerificationConfig {
    pub fn validate(&self) -> Result<(), IntegrityError> {
        if self.interval_secs < INTEGRITY_MIN_INTERVAL_SECS || self.interval_secs > INTEGRITY_MAX_INTERVAL_SECS {
            return Err(IntegrityError::Serialization(format!(
                "interval {}s out of bounds [{}, {}]",
                self.interval_secs, INTEGRITY_MIN_INTERVAL_SECS, INTEGRITY_MAX_INTERVAL_SECS
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CheckOutcome {
    Quick(QuickCheckReport),
    Full(DataIntegrityReport),
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        match self {
            CheckOutcome::Quick(r) => r.passed,
            CheckOutcome::Full(r) => r.passed,
        }
    }
}

/// Dispatches an alert when a scheduled check fails. The no-op sink is the
/// default; `WebhookAlertSink` posts a JSON body to a configured URL.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, repo: &str, snapshot_id: &str, outcome: &CheckOutcome);
}

pub struct NoopAlertSink;

#[async_trait::async_trait]
impl AlertSink for NoopAlertSink {
    async fn alert(&self, _repo: &str, _snapshot_id: &str, _outcome: &CheckOutcome) {}
}

pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookAlertSink {
    async fn alert(&self, repo: &str, snapshot_id: &str, outcome: &CheckOutcome) {
        let body = serde_json::json!({
            "repo": repo,
            "snapshot_id": snapshot_id,
            "outcome": outcome,
        });
        if let Err(e) = self.client.post(&self.url).json(&body).send().await {
            tracing::warn!(error = %e, url = %self.url, "integrity alert webhook delivery failed");
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CheckerStatus {
    pub last_check: Option<Timestamp>,
    pub last_result: Option<CheckOutcome>,
    pub consecutive_failures: u32,
}

struct Shared {
    config: Mutex<VerificationConfig>,
    status: Mutex<CheckerStatus>,
    running: Mutex<()>,
}

/// The scheduled checker. `spawn` starts a dedicated worker task that runs
/// an immediate check, then re-runs on every tick of `config.interval_secs`
/// until `stop()` is called. `update_config` hot-swaps the config for the
/// next tick without restarting the task, mirroring the schedule engine's
/// hot-reload (§4.3) applied to the checker.
pub struct ScheduledChecker {
    shared: Arc<Shared>,
    reload_tx: watch::Sender<()>,
    stop_tx: watch::Sender<bool>,
}

impl ScheduledChecker {
    pub fn new(config: VerificationConfig) -> Self {
        let (reload_tx, _reload_rx) = watch::channel(());
        let (stop_tx, _stop_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config: Mutex::new(config),
                status: Mutex::new(CheckerStatus::default()),
                running: Mutex::new(()),
            }),
            reload_tx,
            stop_tx,
        }
    }

    pub async fn status(&self) -> CheckerStatus {
        self.shared.status.lock().await.clone()
    }

    pub async fn config(&self) -> VerificationConfig {
        self.shared.config.lock().await.clone()
    }

    pub async fn update_config(&self, new_config: VerificationConfig) -> Result<(), IntegrityError> {
        new_config.validate()?;
        *self.shared.config.lock().await = new_config;
        let _ = self.reload_tx.send(());
        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Spawns the worker task. Re-entrant checks (a reload firing mid-check)
    /// coalesce on `running`: a check already in flight is allowed to
    /// finish before the next one starts (§5 "only one check runs at a time
    /// per repository; re-entrant requests coalesce").
    pub fn spawn(self: Arc<Self>, alert_sink: Arc<dyn AlertSink>) -> tokio::task::JoinHandle<()> {
        let mut reload_rx = self.reload_tx.subscribe();
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            self.run_once(&alert_sink, now()).await;

            loop {
                let interval_secs = self.shared.config.lock().await.interval_secs;
                let sleep = tokio::time::sleep(Duration::from_secs(interval_secs.max(1) as u64));
                tokio::pin!(sleep);

                tokio::select! {
                    _ = &mut sleep => {
                        self.run_once(&alert_sink, now()).await;
                    }
                    Ok(()) = reload_rx.changed() => {
                        tracing::info!("scheduled integrity checker config reloaded");
                    }
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            tracing::info!("scheduled integrity checker stopping");
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Runs a check immediately, outside the normal interval cadence (an
    /// owner-initiated "check now"), updating `status` the same way a
    /// scheduled tick would. Returns the outcome so a caller gets the
    /// result synchronously rather than polling `status()`.
    pub async fn run_now(&self, alert_sink: &Arc<dyn AlertSink>) -> Result<CheckOutcome, IntegrityError> {
        self.run_once(alert_sink, now()).await;
        self.shared
            .status
            .lock()
            .await
            .last_result
            .clone()
            .ok_or_else(|| IntegrityError::Serialization("check produced no result".into()))
    }

    async fn run_once(&self, alert_sink: &Arc<dyn AlertSink>, at: Timestamp) {
        let _guard = self.shared.running.lock().await;
        let config = self.shared.config.lock().await.clone();
        if !config.enabled {
            return;
        }

        let outcome = match config.check_type {
            CheckType::Quick => quick_check(
                &config.repo,
                &config.snapshot_id,
                &config.expected_config_hash,
                config.expected_data_file_count,
            )
            .map(CheckOutcome::Quick),
            CheckType::Full => check_data_integrity(&config.repo).map(CheckOutcome::Full),
        };

        let mut status = self.shared.status.lock().await;
        status.last_check = Some(at);
        match outcome {
            Ok(outcome) => {
                let passed = outcome.passed();
                if passed {
                    status.consecutive_failures = 0;
                } else {
                    status.consecutive_failures += 1;
                    tracing::warn!(repo = %config.repo.display(), snapshot_id = %config.snapshot_id, "scheduled integrity check failed");
                    if config.alert_on_corruption {
                        alert_sink.alert(&config.repo.display().to_string(), &config.snapshot_id, &outcome).await;
                    }
                }
                status.last_result = Some(outcome);
            }
            Err(e) => {
                status.consecutive_failures += 1;
                tracing::warn!(error = %e, "scheduled integrity check errored");
            }
        }
    }
}

fn now() -> Timestamp {
    qvault_core::types::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl AlertSink for CountingSink {
        async fn alert(&self, _repo: &str, _snapshot_id: &str, _outcome: &CheckOutcome) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn failing_check_alerts_and_increments_failures() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = VerificationConfig {
            enabled: true,
            interval_secs: 60,
            check_type: CheckType::Quick,
            repo: dir.path().to_path_buf(),
            snapshot_id: "missing-snap".into(),
            alert_on_corruption: true,
            alert_webhook: None,
            expected_config_hash: String::new(),
            expected_data_file_count: 0,
        };
        let checker = Arc::new(ScheduledChecker::new(config));
        let count = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn AlertSink> = Arc::new(CountingSink(Arc::clone(&count)));

        checker.run_once(&sink, 1_700_000_000).await;
        let status = checker.status().await;
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_now_returns_outcome_synchronously() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = VerificationConfig {
            enabled: true,
            interval_secs: 60,
            check_type: CheckType::Quick,
            repo: dir.path().to_path_buf(),
            snapshot_id: "missing-snap".into(),
            alert_on_corruption: false,
            alert_webhook: None,
            expected_config_hash: String::new(),
            expected_data_file_count: 0,
        };
        let checker = Arc::new(ScheduledChecker::new(config));
        let sink: Arc<dyn AlertSink> = Arc::new(NoopAlertSink);
        let outcome = checker.run_now(&sink).await.unwrap();
        assert!(!outcome.passed());
    }

    #[tokio::test]
    async fn disabled_config_skips_check() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = VerificationConfig {
            enabled: false,
            interval_secs: 60,
            check_type: CheckType::Full,
            repo: dir.path().to_path_buf(),
            snapshot_id: "snap".into(),
            alert_on_corruption: true,
            alert_webhook: None,
            expected_config_hash: String::new(),
            expected_data_file_count: 0,
        };
        let checker = Arc::new(ScheduledChecker::new(config));
        let count = Arc::new(AtomicUsize::new(0));
        let sink: Arc<dyn AlertSink> = Arc::new(CountingSink(Arc::clone(&count)));
        checker.run_once(&sink, 1_700_000_000).await;
        assert_eq!(checker.status().await.last_check, None);
        let _ = StdDuration::from_secs(0);
    }
}
