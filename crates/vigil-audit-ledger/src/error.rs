//! Ledger error type.

use vigil_audit_types::{CheckRunId, EventId};

/// Errors from ledger, store and verifier operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A verification range was requested with `from` after `to`.
    #[error("invalid range: fromId {from} is greater than toId {to}")]
    InvalidRange {
        /// Requested range start.
        from: EventId,
        /// Requested range end.
        to: EventId,
    },

    /// A verification range started at id 0.
    #[error("invalid range: fromId must be at least 1")]
    ZeroFromId,

    /// An append carried a blank event type.
    #[error("event type must not be empty")]
    EmptyEventType,

    /// An append carried a blank request id.
    #[error("request id must not be empty")]
    EmptyRequestId,

    /// An append kept losing the race for the chain tail.
    #[error("append contention: gave up after {attempts} attempts for requestId {request_id}")]
    AppendContention {
        /// Request id of the record that could not be appended.
        request_id: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// A check run id was not found.
    #[error("unknown check run {id}")]
    UnknownCheckRun {
        /// The missing id.
        id: CheckRunId,
    },

    /// A check run was finalized twice.
    #[error("check run {id} is already finalized")]
    CheckRunFinalized {
        /// The already-final run.
        id: CheckRunId,
    },

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Shorthand for fallible ledger, store and verifier operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
