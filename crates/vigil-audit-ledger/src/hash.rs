//! SHA-256 hashing for the event chain.

use crate::canonical::canonical;
use sha2::{Digest, Sha256};
use vigil_audit_types::{AuditEvent, NormalizedEvent};

/// Computes and verifies chain hashes.
///
/// The genesis hash is the digest of an operator-chosen seed string and
/// stands in for "the event before the first event"; two ledgers with
/// different seeds produce disjoint chains even over identical records.
#[derive(Debug, Clone)]
pub struct HashEngine {
    genesis_hash: String,
}

impl HashEngine {
    /// Create an engine from the operator's genesis seed.
    pub fn new(genesis_seed: &str) -> Self {
        Self {
            genesis_hash: sha256_hex(genesis_seed),
        }
    }

    /// The hash the first event in the chain must carry as `prev_hash`.
    pub fn genesis_hash(&self) -> &str {
        &self.genesis_hash
    }

    /// Compute the hash of a record given the hash of its predecessor.
    ///
    /// The digest input is `prev_hash + "|" + canonical(record)`.
    pub fn compute_event_hash(&self, prev_hash: &str, record: &NormalizedEvent) -> String {
        let input = format!("{}|{}", prev_hash, canonical(record));
        sha256_hex(&input)
    }

    /// Recompute a stored event's hash and compare to what it carries.
    pub fn verify_event_hash(&self, prev_hash: &str, event: &AuditEvent) -> bool {
        self.compute_event_hash(prev_hash, &event.record) == event.event_hash
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
