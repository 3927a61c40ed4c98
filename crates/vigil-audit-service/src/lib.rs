//! The assembled Vigil audit service.
//!
//! This crate wires the ledger, the integrity verifier and the alert
//! engine into one facade. Construction validates the configuration and
//! builds every component against shared stores, so an ingested event is
//! chained, checkable and alertable without the embedder touching any
//! component directly. Storage, alert delivery and the time source can
//! each be swapped through the builder.

mod config;
mod error;
mod service;

pub use config::{AuditServiceConfig, ConfigError};
pub use error::ServiceError;
pub use service::{AuditService, AuditServiceBuilder, IngestOutcome};
