//! Alerting error type.

use vigil_audit_types::{AlertId, AlertStatus};

/// Errors from alert detection and the alert/dedup stores.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// A detector's ledger read failed.
    #[error(transparent)]
    Ledger(#[from] vigil_audit_ledger::LedgerError),

    /// An alert id was not found.
    #[error("unknown alert {id}")]
    UnknownAlert {
        /// The missing id.
        id: AlertId,
    },

    /// A lifecycle transition was requested out of order.
    #[error("alert {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The alert in question.
        id: AlertId,
        /// Its current status.
        from: AlertStatus,
        /// The requested status.
        to: AlertStatus,
    },

    /// The backing store failed.
    #[error("store error: {0}")]
    Store(String),
}

/// Shorthand for fallible alerting operations.
pub type AlertResult<T> = Result<T, AlertError>;
