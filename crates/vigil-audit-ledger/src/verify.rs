//! Chain integrity verification.

use crate::store::{CheckFinalization, CheckRunStore, EventStore, NewCheckRun};
use crate::{HashEngine, LedgerError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil_audit_types::{CheckRunId, CheckStatus, Clock, EventId, IntegrityCheckRun, SystemClock};

/// Events loaded per store read while walking a range.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Outcome of one verification attempt, as returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    /// The persisted check run this report corresponds to.
    pub check_run_id: CheckRunId,
    /// `OK` or `FAIL`.
    pub status: CheckStatus,
    /// First event id in the requested range.
    pub from_event_id: EventId,
    /// Last event id in the requested range.
    pub to_event_id: EventId,
    /// Last event id proven intact.
    pub last_verified_event_id: Option<EventId>,
    /// Events the walk checked before stopping.
    pub events_checked: u64,
    /// Hash the walk expected at the failure point.
    pub expected_hash: Option<String>,
    /// Hash actually found at the failure point.
    pub found_hash: Option<String>,
    /// Human-readable failure description.
    pub fail_reason: Option<String>,
    /// When the walk started.
    pub started_at: DateTime<Utc>,
    /// When the run was finalized.
    pub finished_at: DateTime<Utc>,
}

impl VerificationReport {
    fn from_run(run: &IntegrityCheckRun, events_checked: u64) -> Self {
        Self {
            check_run_id: run.id,
            status: run.status,
            from_event_id: run.from_event_id,
            to_event_id: run.to_event_id,
            last_verified_event_id: run.last_verified_event_id,
            events_checked,
            expected_hash: run.expected_hash.clone(),
            found_hash: run.found_hash.clone(),
            fail_reason: run.fail_reason.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at.unwrap_or(run.started_at),
        }
    }

    /// Whether the range verified intact.
    pub fn is_ok(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// Walks id ranges of the ledger and re-derives every hash.
///
/// Verification never mutates ledger data; a `FAIL` report is purely
/// diagnostic. Each call persists one check run, created `RUNNING` before
/// the walk and finalized exactly once. Ranges larger than the chunk size
/// are streamed in ascending id order rather than loaded whole.
pub struct IntegrityVerifier {
    events: Arc<dyn EventStore>,
    runs: Arc<dyn CheckRunStore>,
    hash: HashEngine,
    clock: Arc<dyn Clock>,
    chunk_size: usize,
}

enum Walk {
    Intact,
    Broken {
        expected: String,
        found: String,
        reason: String,
    },
    Empty,
    NoPredecessor,
}

impl IntegrityVerifier {
    /// Create a verifier using the wall clock.
    pub fn new(events: Arc<dyn EventStore>, runs: Arc<dyn CheckRunStore>, hash: HashEngine) -> Self {
        Self::with_clock(events, runs, hash, Arc::new(SystemClock))
    }

    /// Create a verifier with an explicit time source.
    pub fn with_clock(
        events: Arc<dyn EventStore>,
        runs: Arc<dyn CheckRunStore>,
        hash: HashEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            runs,
            hash,
            clock,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override how many events are loaded per store read.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Verify the chain over `[from, to]`, inclusive on both ends.
    ///
    /// Returns `Err` only for an inverted range or a check-run store
    /// failure; everything the walk itself finds, including event store
    /// errors mid-walk, finalizes the run and comes back as a `FAIL`
    /// report.
    pub fn verify_range(
        &self,
        from: EventId,
        to: EventId,
    ) -> Result<VerificationReport, LedgerError> {
        if from < EventId::FIRST {
            return Err(LedgerError::ZeroFromId);
        }
        if from > to {
            return Err(LedgerError::InvalidRange { from, to });
        }

        let run = self.runs.create(NewCheckRun {
            started_at: self.clock.now(),
            from_event_id: from,
            to_event_id: to,
        })?;

        let mut last_verified: Option<EventId> = None;
        let mut events_checked: u64 = 0;
        let walk = self.walk(from, to, &mut last_verified, &mut events_checked);

        let finalization = match walk {
            Ok(Walk::Intact) => {
                info!(
                    from = %from,
                    to = %to,
                    events_checked,
                    "integrity check passed"
                );
                CheckFinalization {
                    status: CheckStatus::Ok,
                    last_verified_event_id: last_verified,
                    expected_hash: None,
                    found_hash: None,
                    fail_reason: None,
                }
            }
            Ok(Walk::Broken {
                expected,
                found,
                reason,
            }) => CheckFinalization {
                status: CheckStatus::Fail,
                last_verified_event_id: last_verified,
                expected_hash: Some(expected),
                found_hash: Some(found),
                fail_reason: Some(reason),
            },
            Ok(Walk::Empty) => {
                warn!(from = %from, to = %to, "integrity check found no events in range");
                CheckFinalization {
                    status: CheckStatus::Fail,
                    last_verified_event_id: None,
                    expected_hash: None,
                    found_hash: None,
                    fail_reason: Some("no events found in range".to_string()),
                }
            }
            Ok(Walk::NoPredecessor) => {
                warn!(
                    from = %from,
                    "integrity check could not load the event preceding the range"
                );
                CheckFinalization {
                    status: CheckStatus::Fail,
                    last_verified_event_id: None,
                    expected_hash: None,
                    found_hash: None,
                    fail_reason: Some("predecessor event not found".to_string()),
                }
            }
            Err(store_error) => {
                error!(error = %store_error, "integrity check aborted by store error");
                CheckFinalization {
                    status: CheckStatus::Fail,
                    last_verified_event_id: last_verified,
                    expected_hash: None,
                    found_hash: None,
                    fail_reason: Some(format!("store error: {store_error}")),
                }
            }
        };

        let finished = self.runs.finalize(run.id, self.clock.now(), finalization)?;
        Ok(VerificationReport::from_run(&finished, events_checked))
    }

    fn walk(
        &self,
        from: EventId,
        to: EventId,
        last_verified: &mut Option<EventId>,
        events_checked: &mut u64,
    ) -> Result<Walk, LedgerError> {
        let mut chunk = self.events.find_range(from, to, self.chunk_size)?;
        if chunk.is_empty() {
            return Ok(Walk::Empty);
        }

        let mut expected = if from == EventId::FIRST {
            self.hash.genesis_hash().to_string()
        } else {
            match self.events.find_before(from)? {
                Some(predecessor) => predecessor.event_hash,
                None => return Ok(Walk::NoPredecessor),
            }
        };

        loop {
            for event in &chunk {
                if event.prev_hash != expected {
                    error!(
                        event_id = %event.id,
                        expected = %expected,
                        found = %event.prev_hash,
                        "integrity check failed: prevHash mismatch"
                    );
                    return Ok(Walk::Broken {
                        reason: format!("prevHash mismatch at event {}", event.id),
                        expected,
                        found: event.prev_hash.clone(),
                    });
                }

                let recomputed = self.hash.compute_event_hash(&expected, &event.record);
                if recomputed != event.event_hash {
                    error!(
                        event_id = %event.id,
                        expected = %recomputed,
                        found = %event.event_hash,
                        "integrity check failed: eventHash mismatch"
                    );
                    return Ok(Walk::Broken {
                        reason: format!("eventHash mismatch at event {}", event.id),
                        expected: recomputed,
                        found: event.event_hash.clone(),
                    });
                }

                expected = event.event_hash.clone();
                *last_verified = Some(event.id);
                *events_checked += 1;
            }

            let next = match chunk.last() {
                Some(last) => last.id.next(),
                None => break,
            };
            if next > to {
                break;
            }
            chunk = self.events.find_range(next, to, self.chunk_size)?;
            if chunk.is_empty() {
                // The range reaches past the ledger tail; what exists has
                // been verified.
                break;
            }
        }

        Ok(Walk::Intact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        AppendOutcome, BulkAccessGroup, DeniedAccessGroup, EventFilter, EventPage, ExportGroup,
        LoginFailureGroup, PageRequest, PreparedEvent,
    };
    use crate::{InMemoryCheckRunStore, InMemoryEventStore, Ledger};
    use chrono::TimeZone;
    use vigil_audit_types::{AuditEvent, ManualClock, NormalizedEvent};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("valid"),
        ))
    }

    fn chained_store(count: u64) -> (Arc<InMemoryEventStore>, HashEngine) {
        let store = Arc::new(InMemoryEventStore::new());
        let engine = HashEngine::new("verifier-seed");
        let ledger = Ledger::with_clock(store.clone(), engine.clone(), clock());
        for i in 1..=count {
            let record = NormalizedEvent::builder("LOGIN_SUCCESS", format!("req-{i}"))
                .occurred_at(Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).single().expect("valid"))
                .source_service("auth-service")
                .build();
            ledger.append(record).expect("append");
        }
        (store, engine)
    }

    fn verifier(store: Arc<InMemoryEventStore>, engine: HashEngine) -> IntegrityVerifier {
        IntegrityVerifier::with_clock(store, Arc::new(InMemoryCheckRunStore::new()), engine, clock())
    }

    #[test]
    fn intact_range_verifies_ok() {
        let (store, engine) = chained_store(5);
        let verifier = verifier(store, engine);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(5))
            .expect("verify");

        assert!(report.is_ok());
        assert_eq!(report.events_checked, 5);
        assert_eq!(report.last_verified_event_id, Some(EventId::new(5)));
        assert!(report.fail_reason.is_none());
    }

    #[test]
    fn chunked_walk_covers_the_whole_range() {
        let (store, engine) = chained_store(7);
        let verifier = verifier(store, engine).chunk_size(2);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(7))
            .expect("verify");

        assert!(report.is_ok());
        assert_eq!(report.events_checked, 7);
        assert_eq!(report.last_verified_event_id, Some(EventId::new(7)));
    }

    #[test]
    fn subrange_chains_from_predecessor_hash() {
        let (store, engine) = chained_store(6);
        let verifier = verifier(store, engine);

        let report = verifier
            .verify_range(EventId::new(3), EventId::new(6))
            .expect("verify");

        assert!(report.is_ok());
        assert_eq!(report.events_checked, 4);
    }

    #[test]
    fn range_past_the_tail_verifies_what_exists() {
        let (store, engine) = chained_store(4);
        let verifier = verifier(store, engine);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(100))
            .expect("verify");

        assert!(report.is_ok());
        assert_eq!(report.events_checked, 4);
        assert_eq!(report.last_verified_event_id, Some(EventId::new(4)));
    }

    #[test]
    fn tampered_record_fails_with_event_hash_mismatch() {
        let (store, engine) = chained_store(5);
        store.tamper(EventId::new(3), |event| {
            event.record.actor_user_id = Some(666);
        });
        let verifier = verifier(store.clone(), engine);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(5))
            .expect("verify");

        assert_eq!(report.status, CheckStatus::Fail);
        assert_eq!(report.fail_reason.as_deref(), Some("eventHash mismatch at event 3"));
        assert_eq!(report.last_verified_event_id, Some(EventId::new(2)));
        assert_eq!(report.events_checked, 2);
        // The found hash is the stored one, which no longer covers the record.
        let stored = store
            .find_by_id(EventId::new(3))
            .expect("find")
            .expect("event exists");
        assert_eq!(report.found_hash.as_deref(), Some(stored.event_hash.as_str()));
        assert_ne!(report.expected_hash, report.found_hash);
    }

    #[test]
    fn relinked_event_fails_with_prev_hash_mismatch() {
        let (store, engine) = chained_store(5);
        store.tamper(EventId::new(4), |event| {
            event.prev_hash = "f".repeat(64);
        });
        let verifier = verifier(store, engine);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(5))
            .expect("verify");

        assert_eq!(report.status, CheckStatus::Fail);
        assert_eq!(report.fail_reason.as_deref(), Some("prevHash mismatch at event 4"));
        assert_eq!(report.last_verified_event_id, Some(EventId::new(3)));
        assert_eq!(report.found_hash, Some("f".repeat(64)));
    }

    #[test]
    fn tamper_detection_works_across_chunk_boundaries() {
        let (store, engine) = chained_store(6);
        store.tamper(EventId::new(5), |event| {
            event.record.event_type = "RECORD_DELETED".to_string();
        });
        let verifier = verifier(store, engine).chunk_size(2);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(6))
            .expect("verify");

        assert_eq!(report.status, CheckStatus::Fail);
        assert_eq!(report.fail_reason.as_deref(), Some("eventHash mismatch at event 5"));
        assert_eq!(report.last_verified_event_id, Some(EventId::new(4)));
    }

    #[test]
    fn empty_range_fails_loudly() {
        let (store, engine) = chained_store(0);
        let verifier = verifier(store, engine);

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(10))
            .expect("verify");

        assert_eq!(report.status, CheckStatus::Fail);
        assert_eq!(report.fail_reason.as_deref(), Some("no events found in range"));
        assert_eq!(report.events_checked, 0);
        assert!(report.last_verified_event_id.is_none());
    }

    #[test]
    fn inverted_range_is_rejected_before_any_run_is_created() {
        let (store, engine) = chained_store(3);
        let runs = Arc::new(InMemoryCheckRunStore::new());
        let verifier =
            IntegrityVerifier::with_clock(store, runs.clone(), engine, clock());

        let result = verifier.verify_range(EventId::new(5), EventId::new(2));
        assert!(matches!(result, Err(LedgerError::InvalidRange { .. })));
        assert!(runs.find(CheckRunId::new(1)).expect("find").is_none());
    }

    #[test]
    fn zero_from_id_is_rejected_before_any_run_is_created() {
        let (store, engine) = chained_store(3);
        let runs = Arc::new(InMemoryCheckRunStore::new());
        let verifier =
            IntegrityVerifier::with_clock(store, runs.clone(), engine, clock());

        let result = verifier.verify_range(EventId::new(0), EventId::new(3));
        assert!(matches!(result, Err(LedgerError::ZeroFromId)));
        assert!(runs.find(CheckRunId::new(1)).expect("find").is_none());
    }

    #[test]
    fn check_runs_are_persisted_and_finalized() {
        let (store, engine) = chained_store(3);
        let runs = Arc::new(InMemoryCheckRunStore::new());
        let verifier =
            IntegrityVerifier::with_clock(store, runs.clone(), engine, clock());

        let report = verifier
            .verify_range(EventId::new(1), EventId::new(3))
            .expect("verify");

        let run = runs
            .find(report.check_run_id)
            .expect("find")
            .expect("run exists");
        assert_eq!(run.status, CheckStatus::Ok);
        assert!(run.finished_at.is_some());
        assert_eq!(run.from_event_id, EventId::new(1));
        assert_eq!(run.to_event_id, EventId::new(3));
        assert_eq!(run.last_verified_event_id, Some(EventId::new(3)));
    }

    #[test]
    fn missing_predecessor_fails_instead_of_assuming_genesis() {
        // A store that claims to hold the range but cannot produce the
        // event before it, as a truncated backend would.
        struct TruncatedStore(Arc<InMemoryEventStore>);

        impl EventStore for TruncatedStore {
            fn tail_hash(&self) -> Result<Option<String>, LedgerError> {
                self.0.tail_hash()
            }
            fn find_by_request_id(
                &self,
                request_id: &str,
            ) -> Result<Option<AuditEvent>, LedgerError> {
                self.0.find_by_request_id(request_id)
            }
            fn append_chained(
                &self,
                prepared: PreparedEvent,
            ) -> Result<AppendOutcome, LedgerError> {
                self.0.append_chained(prepared)
            }
            fn find_by_id(&self, id: EventId) -> Result<Option<AuditEvent>, LedgerError> {
                self.0.find_by_id(id)
            }
            fn find_range(
                &self,
                from: EventId,
                to: EventId,
                limit: usize,
            ) -> Result<Vec<AuditEvent>, LedgerError> {
                self.0.find_range(from, to, limit)
            }
            fn find_before(&self, _id: EventId) -> Result<Option<AuditEvent>, LedgerError> {
                Ok(None)
            }
            fn latest(&self) -> Result<Option<AuditEvent>, LedgerError> {
                self.0.latest()
            }
            fn count(&self) -> Result<u64, LedgerError> {
                self.0.count()
            }
            fn query(
                &self,
                filter: &EventFilter,
                page: &PageRequest,
            ) -> Result<EventPage, LedgerError> {
                self.0.query(filter, page)
            }
            fn find_by_trace_id(&self, trace_id: &str) -> Result<Vec<AuditEvent>, LedgerError> {
                self.0.find_by_trace_id(trace_id)
            }
            fn login_failure_groups(
                &self,
                since: DateTime<Utc>,
                min_count: u64,
            ) -> Result<Vec<LoginFailureGroup>, LedgerError> {
                self.0.login_failure_groups(since, min_count)
            }
            fn denied_access_groups(
                &self,
                since: DateTime<Utc>,
                min_count: u64,
            ) -> Result<Vec<DeniedAccessGroup>, LedgerError> {
                self.0.denied_access_groups(since, min_count)
            }
            fn export_request_groups(
                &self,
                since: DateTime<Utc>,
                min_count: u64,
            ) -> Result<Vec<ExportGroup>, LedgerError> {
                self.0.export_request_groups(since, min_count)
            }
            fn bulk_patient_access_groups(
                &self,
                since: DateTime<Utc>,
                min_distinct: u64,
            ) -> Result<Vec<BulkAccessGroup>, LedgerError> {
                self.0.bulk_patient_access_groups(since, min_distinct)
            }
        }

        let (inner, engine) = chained_store(5);
        let verifier = IntegrityVerifier::with_clock(
            Arc::new(TruncatedStore(inner)),
            Arc::new(InMemoryCheckRunStore::new()),
            engine,
            clock(),
        );

        let report = verifier
            .verify_range(EventId::new(3), EventId::new(5))
            .expect("verify");

        assert_eq!(report.status, CheckStatus::Fail);
        assert_eq!(
            report.fail_reason.as_deref(),
            Some("predecessor event not found")
        );
        assert_eq!(report.events_checked, 0);
    }
}
