//! Audit event and alert types for Vigil.
//!
//! This crate holds the data model shared by the ledger, the producer
//! normalization layer and the alert engine: the normalized event record,
//! the ledgered (hash-chained) event, alerts, integrity check runs and the
//! closed vocabularies they use.

mod alert;
mod check_run;
mod clock;
mod event;
pub mod event_types;
mod id;
mod outcome;
mod severity;

pub use alert::{Alert, AlertStatus, AlertType, NewAlert};
pub use check_run::{CheckStatus, IntegrityCheckRun};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{AuditEvent, NormalizedEvent, NormalizedEventBuilder};
pub use id::{AlertId, CheckRunId, EventId};
pub use outcome::AuditOutcome;
pub use severity::{AlertSeverity, AuditSeverity};
