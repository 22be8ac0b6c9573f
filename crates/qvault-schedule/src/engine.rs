//! The scheduler's worker task (§4.3): owns a single task that sleeps
//! until `next_run`, invokes the backup closure, retries with backoff on
//! failure, and records every attempt in a bounded history. Schedule
//! updates hot-swap without restarting the task; cancellation observes a
//! grace period before the caller gives up waiting.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};

use qvault_core::constants::WORKER_STOP_GRACE_SECS;
use qvault_core::types::{now, Timestamp};

use crate::history::{BackupResult, History};
use crate::retry::RetryStrategy;
use crate::spec::ScheduleSpec;

pub type BackupFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type BackupFn = Arc<dyn Fn() -> BackupFuture + Send + Sync>;

/// Lifecycle hooks the scheduler fires around each run (§4.3). Every
/// method has a no-op default so a caller only overrides what it needs.
#[async_trait::async_trait]
pub trait ScheduleCallbacks: Send + Sync {
    async fn on_start(&self, _scheduled_time: Timestamp) {}
    async fn on_success(&self, _result: &BackupResult) {}
    async fn on_failure(&self, _result: &BackupResult) {}
    async fn on_retry_exhausted(&self, _result: &BackupResult) {}
    async fn on_schedule_change(&self, _new_spec: &str) {}
}

pub struct NoopCallbacks;

#[async_trait::async_trait]
impl ScheduleCallbacks for NoopCallbacks {}

struct Shared {
    spec: Mutex<ScheduleSpec>,
    spec_raw: Mutex<String>,
    retry: Mutex<RetryStrategy>,
    history: Mutex<History>,
    last_run: Mutex<Option<Timestamp>>,
}

/// Owns one schedule's lifecycle. `spawn` starts the dedicated worker
/// task; `update_schedule` swaps the spec or retry strategy for the next
/// tick without restarting it; `stop` signals cancellation.
pub struct Scheduler {
    shared: Arc<Shared>,
    reload_tx: watch::Sender<()>,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(spec: ScheduleSpec, spec_raw: String, retry: RetryStrategy) -> Self {
        let (reload_tx, _reload_rx) = watch::channel(());
        let (stop_tx, _stop_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                spec: Mutex::new(spec),
                spec_raw: Mutex::new(spec_raw),
                retry: Mutex::new(retry),
                history: Mutex::new(History::new()),
                last_run: Mutex::new(None),
            }),
            reload_tx,
            stop_tx,
        }
    }

    pub async fn history(&self) -> Vec<BackupResult> {
        self.shared.history.lock().await.entries()
    }

    pub async fn last_run(&self) -> Option<Timestamp> {
        *self.shared.last_run.lock().await
    }

    pub async fn spec_raw(&self) -> String {
        self.shared.spec_raw.lock().await.clone()
    }

    /// Hot-swaps the schedule expression and retry strategy for the next
    /// tick (§4.3 "`update_schedule` replaces the expression without
    /// restarting the task or losing history").
    pub async fn update_schedule(&self, spec: ScheduleSpec, spec_raw: String, retry: RetryStrategy) {
        *self.shared.spec.lock().await = spec;
        *self.shared.spec_raw.lock().await = spec_raw;
        *self.shared.retry.lock().await = retry;
        let _ = self.reload_tx.send(());
    }

    /// Signals the worker task to stop. Does not itself wait for it to
    /// exit; callers that need that use `stop_and_wait`.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Signals cancellation and waits up to `WORKER_STOP_GRACE_SECS` for
    /// the worker task to observe it and exit before giving up.
    pub async fn stop_and_wait(&self, handle: tokio::task::JoinHandle<()>) {
        self.stop();
        let grace = Duration::from_secs(WORKER_STOP_GRACE_SECS);
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!("scheduler worker did not stop within the grace period");
        }
    }

    /// Spawns the worker task. Each iteration recomputes `next_run` from
    /// the current spec and the last completed run (or now, on first
    /// tick), so a hot-swapped schedule takes effect on the very next
    /// wakeup without replaying history.
    pub fn spawn(self: Arc<Self>, backup: BackupFn, callbacks: Arc<dyn ScheduleCallbacks>) -> tokio::task::JoinHandle<()> {
        let mut reload_rx = self.reload_tx.subscribe();
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let after = self.shared.last_run.lock().await.unwrap_or_else(now);
                let spec = self.shared.spec.lock().await.clone();
                let next = match spec.next_run(after) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::error!(error = %e, "scheduler could not compute next run; stopping");
                        return;
                    }
                };
                let delay_secs = (next - now()).max(0) as u64;
                let sleep = tokio::time::sleep(Duration::from_secs(delay_secs));
                tokio::pin!(sleep);

                tokio::select! {
                    _ = &mut sleep => {
                        self.run_with_retry(next, &backup, &callbacks).await;
                    }
                    Ok(()) = reload_rx.changed() => {
                        let raw = self.shared.spec_raw.lock().await.clone();
                        tracing::info!(schedule = %raw, "schedule hot-reloaded");
                        callbacks.on_schedule_change(&raw).await;
                    }
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            tracing::info!("scheduler stopping");
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Runs `backup` once outside the schedule's normal cadence (an
    /// owner-initiated "back up now"), applying the same retry/backoff and
    /// history recording as a scheduled tick. Returns the final attempt's
    /// result.
    pub async fn run_now(&self, backup: &BackupFn, callbacks: &Arc<dyn ScheduleCallbacks>) -> BackupResult {
        self.run_with_retry(now(), backup, callbacks).await;
        self.shared
            .history
            .lock()
            .await
            .entries()
            .last()
            .cloned()
            .expect("run_with_retry always pushes at least one entry")
    }

    /// Runs `backup` once, retrying with the configured backoff strategy
    /// until it succeeds or the retry budget is exhausted, recording every
    /// attempt in history (§4.3).
    async fn run_with_retry(&self, scheduled_time: Timestamp, backup: &BackupFn, callbacks: &Arc<dyn ScheduleCallbacks>) {
        callbacks.on_start(scheduled_time).await;
        let retry = *self.shared.retry.lock().await;
        let mut attempt: u32 = 1;

        loop {
            let start = now();
            let outcome = (backup)().await;
            let end = now();

            match outcome {
                Ok(()) => {
                    let result = BackupResult {
                        scheduled_time,
                        start_time: start,
                        end_time: end,
                        success: true,
                        attempt,
                        will_retry: false,
                        error: None,
                    };
                    self.shared.history.lock().await.push(result.clone());
                    *self.shared.last_run.lock().await = Some(end);
                    callbacks.on_success(&result).await;
                    return;
                }
                Err(e) => {
                    let will_retry = attempt <= retry.max_retries;
                    let result = BackupResult {
                        scheduled_time,
                        start_time: start,
                        end_time: end,
                        success: false,
                        attempt,
                        will_retry,
                        error: Some(e),
                    };
                    self.shared.history.lock().await.push(result.clone());
                    if will_retry {
                        callbacks.on_failure(&result).await;
                        tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    *self.shared.last_run.lock().await = Some(end);
                    callbacks.on_retry_exhausted(&result).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingCallbacks {
        successes: Arc<AtomicUsize>,
        failures: Arc<AtomicUsize>,
        exhausted: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ScheduleCallbacks for CountingCallbacks {
        async fn on_success(&self, _result: &BackupResult) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_failure(&self, _result: &BackupResult) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        async fn on_retry_exhausted(&self, _result: &BackupResult) {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_retry() -> RetryStrategy {
        RetryStrategy {
            max_retries: 2,
            initial_delay: StdDuration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: StdDuration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn successful_backup_records_one_history_entry() {
        let scheduler = Arc::new(Scheduler::new(ScheduleSpec::Interval(3600), "every 1h".into(), fast_retry()));
        let successes = Arc::new(AtomicUsize::new(0));
        let callbacks = Arc::new(CountingCallbacks {
            successes: Arc::clone(&successes),
            failures: Arc::new(AtomicUsize::new(0)),
            exhausted: Arc::new(AtomicUsize::new(0)),
        });
        let backup: BackupFn = Arc::new(|| Box::pin(async { Ok(()) }));

        scheduler.run_with_retry(1_700_000_000, &backup, &(callbacks.clone() as Arc<dyn ScheduleCallbacks>)).await;

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        let history = scheduler.history().await;
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].attempt, 1);
    }

    #[tokio::test]
    async fn failing_backup_retries_then_exhausts() {
        let scheduler = Arc::new(Scheduler::new(ScheduleSpec::Interval(3600), "every 1h".into(), fast_retry()));
        let failures = Arc::new(AtomicUsize::new(0));
        let exhausted = Arc::new(AtomicUsize::new(0));
        let callbacks = Arc::new(CountingCallbacks {
            successes: Arc::new(AtomicUsize::new(0)),
            failures: Arc::clone(&failures),
            exhausted: Arc::clone(&exhausted),
        });
        let backup: BackupFn = Arc::new(|| Box::pin(async { Err("disk full".to_string()) }));

        scheduler.run_with_retry(1_700_000_000, &backup, &(callbacks.clone() as Arc<dyn ScheduleCallbacks>)).await;

        // max_retries = 2 means attempts 1 and 2 retry, attempt 3 exhausts.
        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
        let history = scheduler.history().await;
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| !r.success));
        assert!(!history.last().unwrap().will_retry);
    }

    #[tokio::test]
    async fn run_now_records_history_immediately() {
        let scheduler = Arc::new(Scheduler::new(ScheduleSpec::Interval(3600), "every 1h".into(), fast_retry()));
        let backup: BackupFn = Arc::new(|| Box::pin(async { Ok(()) }));
        let callbacks: Arc<dyn ScheduleCallbacks> = Arc::new(NoopCallbacks);
        let result = scheduler.run_now(&backup, &callbacks).await;
        assert!(result.success);
        assert_eq!(scheduler.history().await.len(), 1);
    }

    #[tokio::test]
    async fn update_schedule_replaces_spec_without_losing_history() {
        let scheduler = Arc::new(Scheduler::new(ScheduleSpec::Interval(3600), "every 1h".into(), fast_retry()));
        let backup: BackupFn = Arc::new(|| Box::pin(async { Ok(()) }));
        let callbacks: Arc<dyn ScheduleCallbacks> = Arc::new(NoopCallbacks);
        scheduler.run_with_retry(1_700_000_000, &backup, &callbacks).await;
        assert_eq!(scheduler.history().await.len(), 1);

        scheduler
            .update_schedule(ScheduleSpec::Interval(60), "every 1m".into(), fast_retry())
            .await;
        assert_eq!(scheduler.spec_raw().await, "every 1m");
        assert_eq!(scheduler.history().await.len(), 1);
    }
}
