/// Language-independent error kind, as used to classify every failure across
/// the workspace (§7). Each crate's own error enum maps its variants onto
/// one of these via a `kind()` method; callers branch on `kind()` rather
/// than matching concrete error variants across crate boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed user-facing input (CLI args, request body). Never retried.
    BadInput,
    /// Hex or JSON decode failure. Never retried.
    BadEncoding,
    /// Signature does not verify.
    BadSignature,
    /// A policy is missing one or both required signatures.
    UnsignedPolicy,
    /// A verification record carries no signature.
    UnsignedRecord,
    /// Operation is invalid for the current state (expired request, deletion
    /// forbidden by policy). No state change occurs.
    BadState,
    /// Request, key-holder, or blob absent.
    NotFound,
    /// Duplicate snapshot, already-signed, append-only violation.
    Conflict,
    /// Quota exceeded, threshold too high.
    ResourceLimit,
    /// I/O error or unreachable peer. Retried by the scheduler.
    Transient,
    /// Detected data corruption; surfaced to all callers and alerted.
    CorruptionDetected,
    /// Startup failure; aborts the process.
    Fatal,
}

impl ErrorKind {
    /// Whether a worker (scheduler, scheduled checker) should retry an
    /// operation that failed with this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::BadEncoding => "bad_encoding",
            ErrorKind::BadSignature => "bad_signature",
            ErrorKind::UnsignedPolicy => "unsigned_policy",
            ErrorKind::UnsignedRecord => "unsigned_record",
            ErrorKind::BadState => "bad_state",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ResourceLimit => "resource_limit",
            ErrorKind::Transient => "transient",
            ErrorKind::CorruptionDetected => "corruption_detected",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Implemented by every crate-local error enum so callers can inspect the
/// kind without matching on concrete variants from a foreign crate.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}
