//! Flat numeric/constant configuration shared across the workspace. Grouped
//! the way a protocol's parameter table usually is: one section per
//! component, values pulled straight from the spec.

// ── Secret-sharing (C1) ──────────────────────────────────────────────────────

/// Maximum total shares `n` a vault may be configured with.
pub const SHARING_MAX_N: u8 = 16;

// ── Consent manager (C4) ─────────────────────────────────────────────────────

/// Default validity window for a freshly created restore or deletion
/// request.
pub const REQUEST_DEFAULT_EXPIRY_SECS: i64 = 24 * 60 * 60;

/// Default `required_approvals` for a deletion request when the caller does
/// not specify one.
pub const DELETION_DEFAULT_REQUIRED_APPROVALS: u32 = 2;

/// Length in bytes of a request id before hex-encoding (128 bits).
pub const REQUEST_ID_BYTES: usize = 16;

// ── Schedule engine (C3) ─────────────────────────────────────────────────────

/// Minimum accepted `every <duration>` interval and 5-field cron granularity.
pub const SCHEDULE_MIN_INTERVAL_SECS: i64 = 60;

/// Maximum accepted `every <duration>` interval.
pub const SCHEDULE_MAX_INTERVAL_SECS: i64 = 30 * 24 * 60 * 60;

/// Upper bound on iterations `next_run` will walk forward before giving up
/// (roughly four years of minutes).
pub const SCHEDULE_MAX_LOOKAHEAD_YEARS: i64 = 4;

/// Bounded size of a schedule's run history ring buffer.
pub const SCHEDULE_HISTORY_CAPACITY: usize = 100;

// ── Integrity checker (C6) ───────────────────────────────────────────────────

/// Minimum and maximum accepted scheduled-check interval.
pub const INTEGRITY_MIN_INTERVAL_SECS: i64 = 60;
pub const INTEGRITY_MAX_INTERVAL_SECS: i64 = 30 * 24 * 60 * 60;

/// Two-character prefix directory length used by the content-addressed
/// blob layout (`data/<XX>/<sha256-hex>`).
pub const BLOB_PREFIX_LEN: usize = 2;

// ── Concurrency (§5) ─────────────────────────────────────────────────────────

/// Grace period a worker task is given to observe cancellation and exit
/// before `stop()` gives up waiting on it.
pub const WORKER_STOP_GRACE_SECS: u64 = 5;

// ── File permissions (§6) ────────────────────────────────────────────────────

/// Mode bits for files containing keys, shares, or approvals.
#[cfg(unix)]
pub const SECRET_FILE_MODE: u32 = 0o600;

/// Mode bits for directories containing secret files.
#[cfg(unix)]
pub const SECRET_DIR_MODE: u32 = 0o700;
