//! The append-only ledger.

use crate::store::{AppendOutcome, EventStore, PreparedEvent};
use crate::{HashEngine, LedgerError};
use std::sync::Arc;
use tracing::{debug, info};
use vigil_audit_types::{AuditEvent, Clock, NormalizedEvent, SystemClock};

/// How many times an append re-reads the tail before giving up. Every lost
/// race means another append committed, so this bounds livelock, not
/// progress.
const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 32;

/// Result of an idempotent append.
#[derive(Debug, Clone)]
pub enum LedgerAppend {
    /// The record joined the chain at a new id.
    Fresh(AuditEvent),
    /// A record with the same request id was already ledgered; this is it.
    Duplicate(AuditEvent),
}

impl LedgerAppend {
    /// The ledgered event, fresh or pre-existing.
    pub fn event(&self) -> &AuditEvent {
        match self {
            Self::Fresh(event) | Self::Duplicate(event) => event,
        }
    }

    /// Consume into the ledgered event.
    pub fn into_event(self) -> AuditEvent {
        match self {
            Self::Fresh(event) | Self::Duplicate(event) => event,
        }
    }

    /// Whether the append was absorbed by idempotency.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Appends normalized records to the hash chain.
///
/// An append observes the current tail, computes the record's hash against
/// it and hands the result to the store's compare-and-swap; when another
/// append lands in between, the tail has moved and the computation is
/// retried against the new tail. Appends are idempotent on request id: a
/// replayed record returns the event ledgered the first time.
pub struct Ledger {
    store: Arc<dyn EventStore>,
    hash: HashEngine,
    clock: Arc<dyn Clock>,
    max_append_attempts: u32,
}

impl Ledger {
    /// Create a ledger over a store, stamping wall-clock receive times.
    pub fn new(store: Arc<dyn EventStore>, hash: HashEngine) -> Self {
        Self::with_clock(store, hash, Arc::new(SystemClock))
    }

    /// Create a ledger with an explicit time source.
    pub fn with_clock(store: Arc<dyn EventStore>, hash: HashEngine, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hash,
            clock,
            max_append_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }

    /// The hashing engine this ledger chains with.
    pub fn hash_engine(&self) -> &HashEngine {
        &self.hash
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Append a normalized record to the chain.
    pub fn append(&self, record: NormalizedEvent) -> Result<LedgerAppend, LedgerError> {
        if record.event_type.is_empty() {
            return Err(LedgerError::EmptyEventType);
        }
        if record.request_id.is_empty() {
            return Err(LedgerError::EmptyRequestId);
        }

        let received_at = self.clock.now();

        for _attempt in 0..self.max_append_attempts {
            if let Some(existing) = self.store.find_by_request_id(&record.request_id)? {
                info!(request_id = %record.request_id, event_id = %existing.id, "duplicate event absorbed");
                return Ok(LedgerAppend::Duplicate(existing));
            }

            let prev_hash = self
                .store
                .tail_hash()?
                .unwrap_or_else(|| self.hash.genesis_hash().to_string());
            let event_hash = self.hash.compute_event_hash(&prev_hash, &record);

            let prepared = PreparedEvent {
                record: record.clone(),
                received_at,
                prev_hash,
                event_hash,
            };

            match self.store.append_chained(prepared)? {
                AppendOutcome::Appended(event) => {
                    debug!(
                        event_id = %event.id,
                        request_id = %event.record.request_id,
                        event_type = %event.record.event_type,
                        "audit event ledgered"
                    );
                    return Ok(LedgerAppend::Fresh(event));
                }
                AppendOutcome::Duplicate(existing) => {
                    info!(request_id = %record.request_id, event_id = %existing.id, "duplicate event absorbed");
                    return Ok(LedgerAppend::Duplicate(existing));
                }
                AppendOutcome::TailMoved => {
                    debug!(request_id = %record.request_id, "chain tail moved, recomputing");
                }
            }
        }

        Err(LedgerError::AppendContention {
            request_id: record.request_id,
            attempts: self.max_append_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryEventStore;
    use chrono::{TimeZone, Utc};
    use vigil_audit_types::{AuditOutcome, EventId, ManualClock};

    fn ledger() -> Ledger {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("valid"),
        );
        Ledger::with_clock(
            Arc::new(InMemoryEventStore::new()),
            HashEngine::new("test-seed"),
            Arc::new(clock),
        )
    }

    fn record(request_id: &str) -> NormalizedEvent {
        NormalizedEvent::builder("LOGIN_FAILURE", request_id)
            .occurred_at(Utc.with_ymd_and_hms(2025, 3, 1, 11, 59, 0).single().expect("valid"))
            .source_service("auth-service")
            .outcome(AuditOutcome::Failure)
            .build()
    }

    #[test]
    fn first_event_chains_to_genesis() {
        let ledger = ledger();
        let appended = ledger.append(record("req-1")).expect("append");
        let event = appended.event();
        assert_eq!(event.id, EventId::FIRST);
        assert_eq!(event.prev_hash, ledger.hash_engine().genesis_hash());
        assert_eq!(
            event.event_hash,
            ledger
                .hash_engine()
                .compute_event_hash(&event.prev_hash, &event.record)
        );
    }

    #[test]
    fn consecutive_events_link_prev_to_event_hash() {
        let ledger = ledger();
        let first = ledger.append(record("req-1")).expect("append").into_event();
        let second = ledger.append(record("req-2")).expect("append").into_event();
        let third = ledger.append(record("req-3")).expect("append").into_event();

        assert_eq!(second.prev_hash, first.event_hash);
        assert_eq!(third.prev_hash, second.event_hash);
        assert_eq!(
            (first.id.value(), second.id.value(), third.id.value()),
            (1, 2, 3)
        );
    }

    #[test]
    fn replayed_request_id_returns_first_ledgering() {
        let ledger = ledger();
        let first = ledger.append(record("req-1")).expect("append").into_event();

        let mut replay = record("req-1");
        replay.ip = Some("10.9.9.9".to_string());
        let result = ledger.append(replay).expect("append");

        assert!(result.is_duplicate());
        let event = result.into_event();
        assert_eq!(event.id, first.id);
        assert_eq!(event.event_hash, first.event_hash);
        // The replayed variant was not ledgered.
        assert!(event.record.ip.is_none());
        assert_eq!(ledger.store().count().expect("count"), 1);
    }

    #[test]
    fn blank_event_type_is_rejected_without_appending() {
        let ledger = ledger();
        let result = ledger.append(NormalizedEvent::builder("", "req-1").build());
        assert!(matches!(result, Err(LedgerError::EmptyEventType)));
        assert_eq!(ledger.store().count().expect("count"), 0);
    }

    #[test]
    fn blank_request_id_is_rejected_without_appending() {
        let ledger = ledger();
        let result = ledger.append(NormalizedEvent::builder("LOGIN_FAILURE", "").build());
        assert!(matches!(result, Err(LedgerError::EmptyRequestId)));
        assert_eq!(ledger.store().count().expect("count"), 0);
    }

    #[test]
    fn concurrent_appends_serialize_onto_one_chain() {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = Arc::new(Ledger::new(store.clone(), HashEngine::new("test-seed")));

        let mut handles = Vec::new();
        for t in 0..4 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    ledger
                        .append(record(&format!("req-{t}-{i}")))
                        .expect("append");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread");
        }

        let engine = HashEngine::new("test-seed");
        let events = store
            .find_range(EventId::new(1), EventId::new(100), 200)
            .expect("range");
        assert_eq!(events.len(), 100);

        let mut expected = engine.genesis_hash().to_string();
        for event in &events {
            assert_eq!(event.prev_hash, expected);
            assert!(engine.verify_event_hash(&expected, event));
            expected = event.event_hash.clone();
        }
    }

    #[test]
    fn concurrent_same_request_id_ledgers_once() {
        let store = Arc::new(InMemoryEventStore::new());
        let ledger = Arc::new(Ledger::new(store.clone(), HashEngine::new("test-seed")));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                ledger.append(record("shared-req")).expect("append")
            }));
        }

        let results: Vec<LedgerAppend> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();

        assert_eq!(store.count().expect("count"), 1);
        assert_eq!(results.iter().filter(|r| !r.is_duplicate()).count(), 1);
        let canonical_id = results[0].event().id;
        assert!(results.iter().all(|r| r.event().id == canonical_id));
    }
}
