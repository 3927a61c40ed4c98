//! Service-level errors.

use thiserror::Error;
use vigil_audit_alerting::AlertError;
use vigil_audit_ingest::NormalizeError;
use vigil_audit_ledger::LedgerError;

/// Errors surfaced by the assembled service.
///
/// Each variant wraps one component's error type unchanged, so callers
/// that care can match through to the source.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A producer payload could not be normalized.
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// The ledger or a verification walk failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The alert pipeline failed.
    #[error(transparent)]
    Alert(#[from] AlertError),
}
