//! Producer payload normalization.
//!
//! Producers publish in three schemas: the direct audit feed, which already
//! speaks the ledger's vocabulary, and two domain feeds (user registration,
//! patient assignment) whose payloads need an event type synthesized and
//! their original fields folded into the details map. Each schema has one
//! explicit normalization path; the ledger only ever sees the normalized
//! record shape, with every required field populated.

mod error;
mod schema;

pub use error::NormalizeError;
pub use schema::{
    AuditFeedRecord, PatientAssignRecord, ProducerEnvelope, ProducerRecord, UserRegisteredRecord,
    TOPIC_AUDIT_EVENTS, TOPIC_PATIENT_ASSIGN, TOPIC_USER_REGISTERED,
};
