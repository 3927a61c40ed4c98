//! Fingerprint store that bounds alert duplication.

use crate::AlertResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use vigil_audit_types::AlertId;

/// One claimed fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    /// Alert the claim was bound to, once created.
    pub alert_id: Option<AlertId>,
    /// When the claim stops suppressing.
    pub expires_at: DateTime<Utc>,
}

/// TTL-keyed fingerprints behind an atomic insert-if-absent.
///
/// The engine claims a fingerprint before creating the alert; losing the
/// claim means another pass already owns the finding and this one skips it
/// entirely. Claims outlive the alert they are bound to until they expire
/// and are reaped.
pub trait DedupStore: Send + Sync {
    /// Claim `key` until `expires_at`. Returns `false` when a live claim
    /// already holds it; an expired claim is replaced.
    fn claim(
        &self,
        key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AlertResult<bool>;

    /// Attach the created alert to a claimed fingerprint.
    fn bind_alert(&self, key: &str, alert_id: AlertId) -> AlertResult<()>;

    /// Drop claims that expired before `now`, returning how many went.
    fn purge_expired(&self, now: DateTime<Utc>) -> AlertResult<u64>;
}

/// Process-local dedup store.
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl InMemoryDedupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fingerprint, expired or not.
    pub fn entry(&self, key: &str) -> Option<DedupEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Number of stored claims, including expired ones awaiting a purge.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no claims are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DedupStore for InMemoryDedupStore {
    fn claim(
        &self,
        key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AlertResult<bool> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            DedupEntry {
                alert_id: None,
                expires_at,
            },
        );
        Ok(true)
    }

    fn bind_alert(&self, key: &str, alert_id: AlertId) -> AlertResult<()> {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.alert_id = Some(alert_id);
        }
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> AlertResult<u64> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        Ok((before - entries.len()) as u64)
    }
}
