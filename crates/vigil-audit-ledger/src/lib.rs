//! Hash-chained audit ledger and integrity verification.
//!
//! The ledger is an append-only sequence of audit events where every event
//! carries a SHA-256 digest over the previous event's digest and its own
//! canonical rendering. Appends are idempotent on the producer request id
//! and serialized through a compare-and-swap on the chain tail. The
//! verifier re-derives the chain over any contiguous id range and records
//! the outcome as an integrity check run.

mod canonical;
mod error;
mod hash;
mod ledger;
mod memory;
mod store;
mod verify;

pub use canonical::canonical;
pub use error::{LedgerError, LedgerResult};
pub use hash::HashEngine;
pub use ledger::{Ledger, LedgerAppend};
pub use memory::{InMemoryCheckRunStore, InMemoryEventStore};
pub use store::{
    AppendOutcome, BulkAccessGroup, CheckFinalization, CheckRunStore, DeniedAccessGroup,
    EventFilter, EventPage, EventStore, ExportGroup, LoginFailureGroup, NewCheckRun, PageRequest,
    PreparedEvent, SortDirection, SortField,
};
pub use verify::{IntegrityVerifier, VerificationReport, DEFAULT_CHUNK_SIZE};
