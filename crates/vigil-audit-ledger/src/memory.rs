//! In-memory store implementations.
//!
//! Reference implementations of [`EventStore`] and [`CheckRunStore`] backed
//! by vectors behind `parking_lot` locks. Events are held in append order,
//! so `events[i].id == i + 1` throughout; the range and predecessor reads
//! rely on that density.

use crate::store::{
    AppendOutcome, BulkAccessGroup, CheckFinalization, CheckRunStore, DeniedAccessGroup,
    EventFilter, EventPage, EventStore, ExportGroup, LoginFailureGroup, NewCheckRun, PageRequest,
    PreparedEvent, SortDirection, SortField,
};
use crate::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use vigil_audit_types::{
    event_types, AuditEvent, AuditOutcome, CheckRunId, CheckStatus, EventId, IntegrityCheckRun,
};

#[derive(Default)]
struct EventState {
    events: Vec<AuditEvent>,
    by_request_id: HashMap<String, usize>,
}

/// In-memory, append-only event store.
#[derive(Default)]
pub struct InMemoryEventStore {
    state: RwLock<EventState>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored event in place, simulating out-of-band tampering
    /// with what should be immutable storage.
    #[cfg(test)]
    pub(crate) fn tamper<F: FnOnce(&mut AuditEvent)>(&self, id: EventId, mutate: F) {
        let mut state = self.state.write();
        let index = (id.value() - 1) as usize;
        mutate(&mut state.events[index]);
    }
}

const BULK_ACCESS_EVENT_TYPES: [&str; 3] = [
    event_types::RECORD_VIEWED,
    event_types::PATIENT_ACCESSED,
    event_types::ASSIGNMENT_CREATED,
];

impl EventStore for InMemoryEventStore {
    fn tail_hash(&self) -> Result<Option<String>, LedgerError> {
        let state = self.state.read();
        Ok(state.events.last().map(|e| e.event_hash.clone()))
    }

    fn find_by_request_id(&self, request_id: &str) -> Result<Option<AuditEvent>, LedgerError> {
        let state = self.state.read();
        Ok(state
            .by_request_id
            .get(request_id)
            .map(|&i| state.events[i].clone()))
    }

    fn append_chained(&self, prepared: PreparedEvent) -> Result<AppendOutcome, LedgerError> {
        let mut state = self.state.write();

        if let Some(&i) = state.by_request_id.get(&prepared.record.request_id) {
            return Ok(AppendOutcome::Duplicate(state.events[i].clone()));
        }

        if let Some(tail) = state.events.last() {
            if tail.event_hash != prepared.prev_hash {
                return Ok(AppendOutcome::TailMoved);
            }
        }

        let index = state.events.len();
        let event = AuditEvent {
            id: EventId::new(index as u64 + 1),
            received_at: prepared.received_at,
            record: prepared.record,
            prev_hash: prepared.prev_hash,
            event_hash: prepared.event_hash,
        };
        state
            .by_request_id
            .insert(event.record.request_id.clone(), index);
        state.events.push(event.clone());

        Ok(AppendOutcome::Appended(event))
    }

    fn find_by_id(&self, id: EventId) -> Result<Option<AuditEvent>, LedgerError> {
        let state = self.state.read();
        let index = match id.value().checked_sub(1) {
            Some(i) => i as usize,
            None => return Ok(None),
        };
        Ok(state.events.get(index).cloned())
    }

    fn find_range(
        &self,
        from: EventId,
        to: EventId,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, LedgerError> {
        let state = self.state.read();
        if from > to || state.events.is_empty() {
            return Ok(Vec::new());
        }
        let start = (from.value().max(1) - 1) as usize;
        if start >= state.events.len() {
            return Ok(Vec::new());
        }
        let end = (to.value() as usize).min(state.events.len());
        Ok(state.events[start..end].iter().take(limit).cloned().collect())
    }

    fn find_before(&self, id: EventId) -> Result<Option<AuditEvent>, LedgerError> {
        let state = self.state.read();
        let index = match id.value().checked_sub(2) {
            Some(i) => i as usize,
            None => return Ok(None),
        };
        Ok(state.events.get(index).cloned())
    }

    fn latest(&self) -> Result<Option<AuditEvent>, LedgerError> {
        let state = self.state.read();
        Ok(state.events.last().cloned())
    }

    fn count(&self) -> Result<u64, LedgerError> {
        let state = self.state.read();
        Ok(state.events.len() as u64)
    }

    fn query(&self, filter: &EventFilter, page: &PageRequest) -> Result<EventPage, LedgerError> {
        let state = self.state.read();
        let mut matched: Vec<&AuditEvent> =
            state.events.iter().filter(|e| filter.matches(e)).collect();

        matched.sort_by(|a, b| {
            let ordering = match page.sort_by {
                SortField::OccurredAt => a.record.occurred_at.cmp(&b.record.occurred_at),
                SortField::ReceivedAt => a.received_at.cmp(&b.received_at),
                SortField::Id => Ordering::Equal,
            };
            let ordering = ordering.then(a.id.cmp(&b.id));
            match page.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let size = page.size.max(1);
        let total_elements = matched.len() as u64;
        let total_pages = total_elements.div_ceil(size as u64);
        let events = matched
            .into_iter()
            .skip(page.page * size)
            .take(size)
            .cloned()
            .collect();

        Ok(EventPage {
            events,
            page: page.page,
            size,
            total_elements,
            total_pages,
        })
    }

    fn find_by_trace_id(&self, trace_id: &str) -> Result<Vec<AuditEvent>, LedgerError> {
        let state = self.state.read();
        Ok(state
            .events
            .iter()
            .filter(|e| e.record.trace_id.as_deref() == Some(trace_id))
            .cloned()
            .collect())
    }

    fn login_failure_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<LoginFailureGroup>, LedgerError> {
        let state = self.state.read();
        let mut groups: BTreeMap<(Option<String>, Option<String>), u64> = BTreeMap::new();
        for event in &state.events {
            let r = &event.record;
            if r.event_type == event_types::LOGIN_FAILURE && r.occurred_at >= since {
                *groups
                    .entry((r.actor_email.clone(), r.ip.clone()))
                    .or_insert(0) += 1;
            }
        }
        Ok(groups
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .map(|((actor_email, ip), count)| LoginFailureGroup {
                actor_email,
                ip,
                count,
            })
            .collect())
    }

    fn denied_access_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<DeniedAccessGroup>, LedgerError> {
        let state = self.state.read();
        let mut groups: BTreeMap<(i64, Option<String>), u64> = BTreeMap::new();
        for event in &state.events {
            let r = &event.record;
            if r.outcome == AuditOutcome::Denied && r.occurred_at >= since {
                if let Some(actor) = r.actor_user_id {
                    *groups.entry((actor, r.ip.clone())).or_insert(0) += 1;
                }
            }
        }
        Ok(groups
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .map(|((actor_user_id, ip), count)| DeniedAccessGroup {
                actor_user_id,
                ip,
                count,
            })
            .collect())
    }

    fn export_request_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<ExportGroup>, LedgerError> {
        let state = self.state.read();
        let mut groups: BTreeMap<Option<i64>, u64> = BTreeMap::new();
        for event in &state.events {
            let r = &event.record;
            if r.event_type == event_types::EXPORT_REQUESTED && r.occurred_at >= since {
                *groups.entry(r.actor_user_id).or_insert(0) += 1;
            }
        }
        Ok(groups
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .map(|(actor_user_id, count)| ExportGroup {
                actor_user_id,
                count,
            })
            .collect())
    }

    fn bulk_patient_access_groups(
        &self,
        since: DateTime<Utc>,
        min_distinct: u64,
    ) -> Result<Vec<BulkAccessGroup>, LedgerError> {
        let state = self.state.read();
        let mut groups: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
        for event in &state.events {
            let r = &event.record;
            if BULK_ACCESS_EVENT_TYPES.contains(&r.event_type.as_str()) && r.occurred_at >= since {
                if let (Some(actor), Some(patient)) = (r.actor_user_id, r.patient_id) {
                    groups.entry(actor).or_default().insert(patient);
                }
            }
        }
        Ok(groups
            .into_iter()
            .filter(|(_, patients)| patients.len() as u64 >= min_distinct)
            .map(|(actor_user_id, patients)| BulkAccessGroup {
                actor_user_id,
                distinct_patients: patients.len() as u64,
            })
            .collect())
    }
}

/// In-memory check run store.
#[derive(Default)]
pub struct InMemoryCheckRunStore {
    runs: RwLock<Vec<IntegrityCheckRun>>,
}

impl InMemoryCheckRunStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckRunStore for InMemoryCheckRunStore {
    fn create(&self, run: NewCheckRun) -> Result<IntegrityCheckRun, LedgerError> {
        let mut runs = self.runs.write();
        let created = IntegrityCheckRun {
            id: CheckRunId::new(runs.len() as u64 + 1),
            started_at: run.started_at,
            finished_at: None,
            from_event_id: run.from_event_id,
            to_event_id: run.to_event_id,
            status: CheckStatus::Running,
            last_verified_event_id: None,
            expected_hash: None,
            found_hash: None,
            fail_reason: None,
        };
        runs.push(created.clone());
        Ok(created)
    }

    fn finalize(
        &self,
        id: CheckRunId,
        finished_at: DateTime<Utc>,
        outcome: CheckFinalization,
    ) -> Result<IntegrityCheckRun, LedgerError> {
        let mut runs = self.runs.write();
        let index = id
            .value()
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|&i| i < runs.len())
            .ok_or(LedgerError::UnknownCheckRun { id })?;

        let run = &mut runs[index];
        if run.status.is_final() {
            return Err(LedgerError::CheckRunFinalized { id });
        }

        run.finished_at = Some(finished_at);
        run.status = outcome.status;
        run.last_verified_event_id = outcome.last_verified_event_id;
        run.expected_hash = outcome.expected_hash;
        run.found_hash = outcome.found_hash;
        run.fail_reason = outcome.fail_reason;

        Ok(run.clone())
    }

    fn find(&self, id: CheckRunId) -> Result<Option<IntegrityCheckRun>, LedgerError> {
        let runs = self.runs.read();
        let index = match id.value().checked_sub(1) {
            Some(i) => i as usize,
            None => return Ok(None),
        };
        Ok(runs.get(index).cloned())
    }
}
