//! Storage traits for events and check runs.

use crate::LedgerResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vigil_audit_types::{
    AuditEvent, AuditOutcome, AuditSeverity, CheckRunId, CheckStatus, EventId, IntegrityCheckRun,
    NormalizedEvent,
};

/// A record with its chain fields computed against an observed tail,
/// awaiting the store's compare-and-swap.
#[derive(Debug, Clone)]
pub struct PreparedEvent {
    /// The normalized record to persist.
    pub record: NormalizedEvent,
    /// Ingestion timestamp.
    pub received_at: DateTime<Utc>,
    /// Tail hash the caller observed.
    pub prev_hash: String,
    /// Digest computed over `prev_hash` and the record.
    pub event_hash: String,
}

/// What happened to an attempted append.
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// The event was persisted at the next id.
    Appended(AuditEvent),
    /// Another append won the tail race since the caller observed it;
    /// re-observe and recompute.
    TailMoved,
    /// An event with this request id already exists.
    Duplicate(AuditEvent),
}

/// One (email, ip) login-failure group over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFailureGroup {
    /// Email the failures were attributed to, when the producer sent one.
    pub actor_email: Option<String>,
    /// Source IP, when the producer sent one.
    pub ip: Option<String>,
    /// Matching events in the window.
    pub count: u64,
}

/// One (actor, ip) denied-access group over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeniedAccessGroup {
    /// The denied actor.
    pub actor_user_id: i64,
    /// Source IP, when the producer sent one.
    pub ip: Option<String>,
    /// Matching events in the window.
    pub count: u64,
}

/// One actor's export-request count over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportGroup {
    /// The requesting actor; anonymous requests group together under `None`.
    pub actor_user_id: Option<i64>,
    /// Matching events in the window.
    pub count: u64,
}

/// One actor's distinct-patient touch count over a trailing window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkAccessGroup {
    /// The accessing actor.
    pub actor_user_id: i64,
    /// Distinct patients touched in the window.
    pub distinct_patients: u64,
}

/// Equality filters for ledger queries. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Lower bound on `occurred_at`, inclusive.
    pub from_date: Option<DateTime<Utc>>,
    /// Upper bound on `occurred_at`, inclusive.
    pub to_date: Option<DateTime<Utc>>,
    /// Exact source service.
    pub source_service: Option<String>,
    /// Exact event type.
    pub event_type: Option<String>,
    /// Exact outcome.
    pub outcome: Option<AuditOutcome>,
    /// Exact severity.
    pub severity: Option<AuditSeverity>,
    /// Exact acting user.
    pub actor_user_id: Option<i64>,
    /// Exact actor email.
    pub actor_email: Option<String>,
    /// Exact actor role.
    pub actor_role: Option<String>,
    /// Exact patient context.
    pub patient_id: Option<i64>,
    /// Exact record context.
    pub record_id: Option<i64>,
    /// Exact targeted user.
    pub target_user_id: Option<i64>,
    /// Exact source IP.
    pub ip: Option<String>,
}

impl EventFilter {
    /// Check whether an event passes every set filter.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        let r = &event.record;
        if let Some(from) = self.from_date {
            if r.occurred_at < from {
                return false;
            }
        }
        if let Some(to) = self.to_date {
            if r.occurred_at > to {
                return false;
            }
        }
        if let Some(ref v) = self.source_service {
            if &r.source_service != v {
                return false;
            }
        }
        if let Some(ref v) = self.event_type {
            if &r.event_type != v {
                return false;
            }
        }
        if let Some(v) = self.outcome {
            if r.outcome != v {
                return false;
            }
        }
        if let Some(v) = self.severity {
            if r.severity != v {
                return false;
            }
        }
        if let Some(v) = self.actor_user_id {
            if r.actor_user_id != Some(v) {
                return false;
            }
        }
        if let Some(ref v) = self.actor_email {
            if r.actor_email.as_deref() != Some(v.as_str()) {
                return false;
            }
        }
        if let Some(ref v) = self.actor_role {
            if r.actor_role.as_deref() != Some(v.as_str()) {
                return false;
            }
        }
        if let Some(v) = self.patient_id {
            if r.patient_id != Some(v) {
                return false;
            }
        }
        if let Some(v) = self.record_id {
            if r.record_id != Some(v) {
                return false;
            }
        }
        if let Some(v) = self.target_user_id {
            if r.target_user_id != Some(v) {
                return false;
            }
        }
        if let Some(ref v) = self.ip {
            if r.ip.as_deref() != Some(v.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Field a query page is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    /// Order by when the event happened at the source.
    OccurredAt,
    /// Order by when the ledger accepted the event.
    ReceivedAt,
    /// Order by ledger position.
    Id,
}

/// Direction a query page is ordered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    /// Oldest or smallest first.
    Asc,
    /// Newest or largest first.
    Desc,
}

/// Pagination and ordering for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: usize,
    /// Events per page.
    pub size: usize,
    /// Ordering field.
    pub sort_by: SortField,
    /// Ordering direction.
    pub direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: 50,
            sort_by: SortField::OccurredAt,
            direction: SortDirection::Desc,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// The events on this page, in requested order.
    pub events: Vec<AuditEvent>,
    /// Zero-based page index.
    pub page: usize,
    /// Requested page size.
    pub size: usize,
    /// Matching events across all pages.
    pub total_elements: u64,
    /// Pages needed for all matching events.
    pub total_pages: u64,
}

/// Append-only storage for ledgered events.
///
/// Implementations must make `append_chained` atomic: the duplicate check,
/// the tail comparison and the insert happen under one guard, so two racing
/// appends can never both claim the same tail or the same request id.
pub trait EventStore: Send + Sync {
    /// Hash of the newest event, `None` while the ledger is empty.
    fn tail_hash(&self) -> LedgerResult<Option<String>>;

    /// Look up an event by producer request id.
    fn find_by_request_id(&self, request_id: &str) -> LedgerResult<Option<AuditEvent>>;

    /// Attempt to append a prepared event on the tail it was computed
    /// against.
    fn append_chained(&self, prepared: PreparedEvent) -> LedgerResult<AppendOutcome>;

    /// Look up an event by id.
    fn find_by_id(&self, id: EventId) -> LedgerResult<Option<AuditEvent>>;

    /// Events with id in `[from, to]`, ascending, at most `limit`.
    fn find_range(
        &self,
        from: EventId,
        to: EventId,
        limit: usize,
    ) -> LedgerResult<Vec<AuditEvent>>;

    /// The event with the largest id strictly below `id`.
    fn find_before(&self, id: EventId) -> LedgerResult<Option<AuditEvent>>;

    /// The newest event, `None` while the ledger is empty.
    fn latest(&self) -> LedgerResult<Option<AuditEvent>>;

    /// Number of ledgered events.
    fn count(&self) -> LedgerResult<u64>;

    /// Filtered, ordered, paginated read.
    fn query(&self, filter: &EventFilter, page: &PageRequest) -> LedgerResult<EventPage>;

    /// All events sharing a trace id, ascending by id.
    fn find_by_trace_id(&self, trace_id: &str) -> LedgerResult<Vec<AuditEvent>>;

    /// `LOGIN_FAILURE` events since `since`, grouped by (email, ip),
    /// keeping groups with at least `min_count` events.
    fn login_failure_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> LedgerResult<Vec<LoginFailureGroup>>;

    /// `DENIED` events with a known actor since `since`, grouped by
    /// (actor, ip), keeping groups with at least `min_count` events.
    fn denied_access_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> LedgerResult<Vec<DeniedAccessGroup>>;

    /// `EXPORT_REQUESTED` events since `since`, grouped by actor, keeping
    /// groups with at least `min_count` events.
    fn export_request_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> LedgerResult<Vec<ExportGroup>>;

    /// Patient-touching events since `since`, grouped by actor, keeping
    /// actors having touched at least `min_distinct` distinct patients.
    fn bulk_patient_access_groups(
        &self,
        since: DateTime<Utc>,
        min_distinct: u64,
    ) -> LedgerResult<Vec<BulkAccessGroup>>;
}

/// Fields for a check run created at verification start.
#[derive(Debug, Clone)]
pub struct NewCheckRun {
    /// When the walk started.
    pub started_at: DateTime<Utc>,
    /// First event id in the requested range.
    pub from_event_id: EventId,
    /// Last event id in the requested range.
    pub to_event_id: EventId,
}

/// Terminal fields written when a run is finalized.
#[derive(Debug, Clone)]
pub struct CheckFinalization {
    /// `OK` or `FAIL`.
    pub status: CheckStatus,
    /// Last event id proven intact.
    pub last_verified_event_id: Option<EventId>,
    /// Hash the walk expected at the failure point.
    pub expected_hash: Option<String>,
    /// Hash actually found at the failure point.
    pub found_hash: Option<String>,
    /// Human-readable failure description.
    pub fail_reason: Option<String>,
}

/// Storage for integrity check runs.
pub trait CheckRunStore: Send + Sync {
    /// Persist a run in `RUNNING` state.
    fn create(&self, run: NewCheckRun) -> LedgerResult<IntegrityCheckRun>;

    /// Finalize a running run exactly once.
    fn finalize(
        &self,
        id: CheckRunId,
        finished_at: DateTime<Utc>,
        outcome: CheckFinalization,
    ) -> LedgerResult<IntegrityCheckRun>;

    /// Look up a run by id.
    fn find(&self, id: CheckRunId) -> LedgerResult<Option<IntegrityCheckRun>>;
}
