//! End-to-end flows through the assembled audit service.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use vigil_audit_alerting::{AlertError, ChannelPublisher};
use vigil_audit_ingest::{
    NormalizeError, TOPIC_AUDIT_EVENTS, TOPIC_PATIENT_ASSIGN, TOPIC_USER_REGISTERED,
};
use vigil_audit_ledger::{
    AppendOutcome, BulkAccessGroup, DeniedAccessGroup, EventFilter, EventPage, EventStore,
    ExportGroup, InMemoryEventStore, LedgerError, LoginFailureGroup, PageRequest, PreparedEvent,
    SortDirection, SortField,
};
use vigil_audit_service::{AuditService, AuditServiceConfig, ServiceError};
use vigil_audit_types::{
    AlertSeverity, AlertStatus, AlertType, AuditEvent, AuditOutcome, CheckStatus, Clock, EventId,
    ManualClock, NormalizedEvent,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 7, 23, 20, 30)
        .single()
        .expect("valid timestamp")
}

fn login_failure(n: usize, at: DateTime<Utc>) -> NormalizedEvent {
    NormalizedEvent::builder("LOGIN_FAILURE", format!("req-fail-{n}"))
        .occurred_at(at)
        .actor_email("eve@example.com")
        .ip("203.0.113.9")
        .outcome(AuditOutcome::Failure)
        .build()
}

/// Event store that serves one event with a corrupted stored hash,
/// standing in for out-of-band tampering.
struct CorruptedStore {
    inner: InMemoryEventStore,
    target: EventId,
}

impl CorruptedStore {
    fn new(target: EventId) -> Self {
        Self {
            inner: InMemoryEventStore::new(),
            target,
        }
    }

    fn corrupt(&self, mut event: AuditEvent) -> AuditEvent {
        if event.id == self.target {
            event.event_hash = "0".repeat(64);
        }
        event
    }
}

impl EventStore for CorruptedStore {
    fn tail_hash(&self) -> Result<Option<String>, LedgerError> {
        self.inner.tail_hash()
    }

    fn find_by_request_id(&self, request_id: &str) -> Result<Option<AuditEvent>, LedgerError> {
        self.inner.find_by_request_id(request_id)
    }

    fn append_chained(&self, prepared: PreparedEvent) -> Result<AppendOutcome, LedgerError> {
        self.inner.append_chained(prepared)
    }

    fn find_by_id(&self, id: EventId) -> Result<Option<AuditEvent>, LedgerError> {
        Ok(self.inner.find_by_id(id)?.map(|e| self.corrupt(e)))
    }

    fn find_range(
        &self,
        from: EventId,
        to: EventId,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, LedgerError> {
        Ok(self
            .inner
            .find_range(from, to, limit)?
            .into_iter()
            .map(|e| self.corrupt(e))
            .collect())
    }

    fn find_before(&self, id: EventId) -> Result<Option<AuditEvent>, LedgerError> {
        Ok(self.inner.find_before(id)?.map(|e| self.corrupt(e)))
    }

    fn latest(&self) -> Result<Option<AuditEvent>, LedgerError> {
        Ok(self.inner.latest()?.map(|e| self.corrupt(e)))
    }

    fn count(&self) -> Result<u64, LedgerError> {
        self.inner.count()
    }

    fn query(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<EventPage, LedgerError> {
        let mut result = self.inner.query(filter, page)?;
        result.events = result.events.into_iter().map(|e| self.corrupt(e)).collect();
        Ok(result)
    }

    fn find_by_trace_id(&self, trace_id: &str) -> Result<Vec<AuditEvent>, LedgerError> {
        self.inner.find_by_trace_id(trace_id)
    }

    fn login_failure_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<LoginFailureGroup>, LedgerError> {
        self.inner.login_failure_groups(since, min_count)
    }

    fn denied_access_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<DeniedAccessGroup>, LedgerError> {
        self.inner.denied_access_groups(since, min_count)
    }

    fn export_request_groups(
        &self,
        since: DateTime<Utc>,
        min_count: u64,
    ) -> Result<Vec<ExportGroup>, LedgerError> {
        self.inner.export_request_groups(since, min_count)
    }

    fn bulk_patient_access_groups(
        &self,
        since: DateTime<Utc>,
        min_distinct: u64,
    ) -> Result<Vec<BulkAccessGroup>, LedgerError> {
        self.inner.bulk_patient_access_groups(since, min_distinct)
    }
}

#[test]
fn ingested_events_link_into_a_verified_chain() {
    let service = AuditService::in_memory(AuditServiceConfig::default()).unwrap();

    for n in 1..=5i64 {
        let record = NormalizedEvent::builder("RECORD_VIEWED", format!("req-{n}"))
            .actor_user_id(34)
            .patient_id(n)
            .build();
        let outcome = service.ingest_normalized(record).unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(outcome.event.id, EventId::new(n as u64));
    }

    let page = service
        .query_chain(
            &EventFilter::default(),
            &PageRequest {
                sort_by: SortField::Id,
                direction: SortDirection::Asc,
                ..PageRequest::default()
            },
        )
        .unwrap();
    assert_eq!(page.total_elements, 5);
    assert_eq!(page.events[0].prev_hash, service.genesis_hash());
    for pair in page.events.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].event_hash);
    }

    let report = service
        .verify_range(EventId::new(1), EventId::new(5))
        .unwrap();
    assert!(report.is_ok());
    assert_eq!(report.events_checked, 5);
    assert_eq!(report.last_verified_event_id, Some(EventId::new(5)));
    assert_eq!(service.alert_stats().unwrap().total(), 0);
}

#[test]
fn duplicate_request_ids_collapse_to_one_event() {
    let service = AuditService::in_memory(AuditServiceConfig::default()).unwrap();

    let record = NormalizedEvent::builder("LOGOUT", "req-1")
        .actor_user_id(5)
        .build();
    let first = service.ingest_normalized(record.clone()).unwrap();
    let replay = service.ingest_normalized(record).unwrap();

    assert!(!first.duplicate);
    assert!(replay.duplicate);
    assert_eq!(replay.event.id, first.event.id);
    assert_eq!(replay.event.event_hash, first.event.event_hash);
    assert_eq!(service.event_count().unwrap(), 1);
}

#[test]
fn policy_change_ingest_raises_a_critical_alert() {
    let (publisher, mut outbox) = ChannelPublisher::new(8);
    let service = AuditService::builder(AuditServiceConfig::default())
        .publisher(Arc::new(publisher))
        .build()
        .unwrap();

    let outcome = service
        .ingest(
            TOPIC_AUDIT_EVENTS,
            r#"{
                "eventType": "MFA_DISABLED",
                "requestId": "req-mfa",
                "occurredAt": "2026-02-07T23:20:30Z",
                "actorUserId": 9,
                "actorEmail": "admin@example.com",
                "targetUserId": 41,
                "ip": "10.0.0.5"
            }"#,
        )
        .unwrap();

    let alert = outcome.immediate_alert.expect("policy alert");
    assert_eq!(alert.alert_type, AlertType::AdminPolicyChange);
    assert_eq!(alert.severity, AlertSeverity::Critical);
    assert_eq!(alert.status, AlertStatus::Open);
    assert_eq!(alert.title, "Policy Change Detected: MFA_DISABLED");
    assert_eq!(
        alert.message,
        "User admin@example.com performed MFA_DISABLED action. Target user: 41, IP: 10.0.0.5"
    );
    assert_eq!(alert.evidence.get("eventId"), Some(&Value::from(1)));
    assert_eq!(
        alert.evidence.get("eventType"),
        Some(&Value::from("MFA_DISABLED"))
    );
    assert_eq!(
        alert.evidence.get("occurredAt"),
        Some(&Value::from("2026-02-07T23:20:30.000000Z"))
    );

    assert_eq!(service.alerts_with_status(AlertStatus::Open).unwrap().len(), 1);

    let delivered = outbox.try_recv().expect("published");
    assert_eq!(delivered.alert_id, alert.id);
    assert_eq!(
        delivered.routing_key(),
        format!("ADMIN_POLICY_CHANGE-{}", alert.id)
    );
}

#[test]
fn failed_login_burst_alerts_once_within_the_ttl() {
    let clock = ManualClock::new(start());
    let service = AuditService::builder(AuditServiceConfig::default())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    for n in 0..5 {
        service
            .ingest_normalized(login_failure(n, clock.now()))
            .unwrap();
    }

    let raised = service.run_detection_pass().unwrap();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].alert_type, AlertType::RepeatedFailedLogin);
    assert_eq!(raised[0].severity, AlertSeverity::High);
    assert_eq!(
        raised[0].message,
        "5 failed login attempts from email eve@example.com, IP 203.0.113.9 in last 5 minutes"
    );

    // A sixth failure inside the dedup TTL stays quiet.
    service
        .ingest_normalized(login_failure(5, clock.now()))
        .unwrap();
    let raised = service.run_detection_pass().unwrap();
    assert!(raised.is_empty());
    assert_eq!(service.alert_stats().unwrap().open, 1);
}

#[test]
fn tampered_event_fails_verification_and_raises_a_chain_alert() {
    let service = AuditService::builder(AuditServiceConfig::default())
        .events(Arc::new(CorruptedStore::new(EventId::new(3))))
        .build()
        .unwrap();

    for n in 1..=5 {
        service
            .ingest_normalized(
                NormalizedEvent::builder("RECORD_VIEWED", format!("req-{n}"))
                    .actor_user_id(34)
                    .build(),
            )
            .unwrap();
    }

    let report = service
        .verify_range(EventId::new(1), EventId::new(5))
        .unwrap();
    assert_eq!(report.status, CheckStatus::Fail);
    assert_eq!(report.events_checked, 2);
    assert_eq!(report.last_verified_event_id, Some(EventId::new(2)));
    assert_eq!(
        report.fail_reason.as_deref(),
        Some("eventHash mismatch at event 3")
    );
    assert_eq!(report.found_hash.as_deref(), Some("0".repeat(64).as_str()));

    let run = service
        .find_check_run(report.check_run_id)
        .unwrap()
        .expect("run recorded");
    assert_eq!(run.status, CheckStatus::Fail);

    let open = service.alerts_with_status(AlertStatus::Open).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].alert_type, AlertType::AuditChainFail);
    assert_eq!(open[0].severity, AlertSeverity::Critical);
    assert_eq!(
        open[0].message,
        "Audit log tamper detection triggered: eventHash mismatch at event 3"
    );
    assert_eq!(
        open[0].evidence.get("failReason"),
        Some(&Value::from("eventHash mismatch at event 3"))
    );
    assert_eq!(
        open[0].evidence.get("checkRunId"),
        Some(&Value::from(report.check_run_id.value()))
    );
}

#[test]
fn empty_range_verification_fails_and_alerts() {
    let service = AuditService::in_memory(AuditServiceConfig::default()).unwrap();

    let report = service
        .verify_range(EventId::new(1), EventId::new(10))
        .unwrap();
    assert_eq!(report.status, CheckStatus::Fail);
    assert_eq!(report.events_checked, 0);
    assert_eq!(report.last_verified_event_id, None);
    assert_eq!(report.fail_reason.as_deref(), Some("no events found in range"));

    let open = service.alerts_with_status(AlertStatus::Open).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].alert_type, AlertType::AuditChainFail);
}

#[test]
fn unroutable_payloads_are_rejected_before_the_ledger() {
    let service = AuditService::in_memory(AuditServiceConfig::default()).unwrap();

    let err = service.ingest("billing-events", "{}").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Normalize(NormalizeError::UnknownTopic { .. })
    ));

    let err = service
        .ingest(TOPIC_AUDIT_EVENTS, r#"{"actorUserId": 1}"#)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Normalize(NormalizeError::MissingEventType)
    ));

    assert_eq!(service.event_count().unwrap(), 0);
}

#[test]
fn operator_triage_walks_the_alert_lifecycle() {
    let service = AuditService::in_memory(AuditServiceConfig::default()).unwrap();

    let outcome = service
        .ingest_normalized(
            NormalizedEvent::builder("ROLE_CHANGED", "req-role")
                .actor_user_id(9)
                .target_user_id(41)
                .build(),
        )
        .unwrap();
    let alert = outcome.immediate_alert.expect("raised");
    assert_eq!(alert.severity, AlertSeverity::High);

    let acked = service.acknowledge_alert(alert.id).unwrap();
    assert_eq!(acked.status, AlertStatus::Acked);
    let resolved = service.resolve_alert(alert.id).unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    let err = service.acknowledge_alert(alert.id).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Alert(AlertError::InvalidTransition { .. })
    ));

    let stats = service.alert_stats().unwrap();
    assert_eq!(stats.open, 0);
    assert_eq!(stats.resolved, 1);

    assert_eq!(service.alerts_for_actor(9).unwrap().len(), 1);
    assert!(service.find_alert(alert.id).unwrap().is_some());
}

#[test]
fn domain_feeds_normalize_and_chain() {
    let service = AuditService::in_memory(AuditServiceConfig::default()).unwrap();

    let registered = service
        .ingest(
            TOPIC_USER_REGISTERED,
            r#"{
                "requestId": "req-reg",
                "userName": "Ada",
                "userEmail": "ada@example.com",
                "role": "DOCTOR"
            }"#,
        )
        .unwrap();
    assert_eq!(registered.event.record.event_type, "USER_REGISTERED");
    assert_eq!(
        registered.event.record.actor_email.as_deref(),
        Some("ada@example.com")
    );

    let assigned = service
        .ingest(
            TOPIC_PATIENT_ASSIGN,
            r#"{"requestId": "req-assign", "patientId": 7, "doctorId": 34}"#,
        )
        .unwrap();
    assert_eq!(assigned.event.record.event_type, "PATIENT_ASSIGNED");
    assert_eq!(assigned.event.record.actor_user_id, Some(34));
    assert_eq!(assigned.event.prev_hash, registered.event.event_hash);

    let report = service
        .verify_range(EventId::new(1), EventId::new(2))
        .unwrap();
    assert!(report.is_ok());
}

#[tokio::test(start_paused = true)]
async fn detection_loop_runs_until_stopped() {
    let clock = ManualClock::new(start());
    let service = AuditService::builder(AuditServiceConfig::default())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    for n in 0..5 {
        service
            .ingest_normalized(login_failure(n, clock.now()))
            .unwrap();
    }

    let handle = service.spawn_detection_loop();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(service.alert_stats().unwrap().open, 1);
    assert!(handle.is_running());
    handle.stop().await;
}
