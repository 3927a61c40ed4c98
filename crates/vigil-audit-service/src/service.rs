//! The assembled audit service.

use crate::config::{AuditServiceConfig, ConfigError};
use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use vigil_audit_alerting::{
    AlertEngine, AlertPublisher, AlertStats, AlertStore, DedupStore, DetectionLoop,
    InMemoryAlertStore, InMemoryDedupStore, LogPublisher,
};
use vigil_audit_ingest::ProducerRecord;
use vigil_audit_ledger::{
    CheckRunStore, EventFilter, EventPage, EventStore, HashEngine, InMemoryCheckRunStore,
    InMemoryEventStore, IntegrityVerifier, Ledger, PageRequest, VerificationReport,
};
use vigil_audit_types::{
    Alert, AlertId, AlertSeverity, AlertStatus, AuditEvent, CheckRunId, Clock, EventId,
    IntegrityCheckRun, NormalizedEvent, SystemClock,
};

/// What one ingest call produced.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The stored event, newly appended or already present.
    pub event: AuditEvent,
    /// Whether the request id had been appended before this call.
    pub duplicate: bool,
    /// Alert raised by the immediate check, if any.
    pub immediate_alert: Option<Alert>,
}

/// Wires component overrides into an [`AuditService`].
///
/// Every component defaults to its in-process implementation; override
/// the ones that should live elsewhere.
pub struct AuditServiceBuilder {
    config: AuditServiceConfig,
    events: Option<Arc<dyn EventStore>>,
    runs: Option<Arc<dyn CheckRunStore>>,
    alerts: Option<Arc<dyn AlertStore>>,
    dedup: Option<Arc<dyn DedupStore>>,
    publisher: Option<Arc<dyn AlertPublisher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AuditServiceBuilder {
    fn new(config: AuditServiceConfig) -> Self {
        Self {
            config,
            events: None,
            runs: None,
            alerts: None,
            dedup: None,
            publisher: None,
            clock: None,
        }
    }

    /// Use a custom event store.
    pub fn events(mut self, store: Arc<dyn EventStore>) -> Self {
        self.events = Some(store);
        self
    }

    /// Use a custom check run store.
    pub fn runs(mut self, store: Arc<dyn CheckRunStore>) -> Self {
        self.runs = Some(store);
        self
    }

    /// Use a custom alert store.
    pub fn alerts(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.alerts = Some(store);
        self
    }

    /// Use a custom dedup claim store.
    pub fn dedup(mut self, store: Arc<dyn DedupStore>) -> Self {
        self.dedup = Some(store);
        self
    }

    /// Deliver raised alerts somewhere other than the log.
    pub fn publisher(mut self, publisher: Arc<dyn AlertPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Use an explicit time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the service.
    pub fn build(self) -> Result<AuditService, ConfigError> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self
            .events
            .unwrap_or_else(|| Arc::new(InMemoryEventStore::new()));
        let runs = self
            .runs
            .unwrap_or_else(|| Arc::new(InMemoryCheckRunStore::new()));
        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(InMemoryAlertStore::new()));
        let dedup = self
            .dedup
            .unwrap_or_else(|| Arc::new(InMemoryDedupStore::new()));
        let publisher = self.publisher.unwrap_or_else(|| Arc::new(LogPublisher));

        let hash = HashEngine::new(&self.config.genesis_seed);
        let ledger = Ledger::with_clock(Arc::clone(&events), hash.clone(), Arc::clone(&clock));
        let verifier = IntegrityVerifier::with_clock(
            Arc::clone(&events),
            Arc::clone(&runs),
            hash,
            Arc::clone(&clock),
        )
        .chunk_size(self.config.verifier_chunk_size);
        let engine = Arc::new(AlertEngine::with_clock(
            Arc::clone(&events),
            Arc::clone(&alerts),
            dedup,
            publisher,
            self.config.alerts.clone(),
            Arc::clone(&clock),
        ));

        info!(
            verifier_chunk_size = self.config.verifier_chunk_size,
            detection_period_seconds = self.config.alerts.detection_period_seconds,
            "audit service assembled"
        );

        Ok(AuditService {
            config: self.config,
            ledger,
            verifier,
            engine,
            events,
            runs,
            alerts,
            clock,
        })
    }
}

/// Ledger, verifier and alert engine assembled behind one surface.
///
/// Construction validates the configuration first; a service that exists
/// is one whose components all agreed on their settings. All operations
/// take `&self` and the service can be shared across tasks in an `Arc`.
pub struct AuditService {
    config: AuditServiceConfig,
    ledger: Ledger,
    verifier: IntegrityVerifier,
    engine: Arc<AlertEngine>,
    events: Arc<dyn EventStore>,
    runs: Arc<dyn CheckRunStore>,
    alerts: Arc<dyn AlertStore>,
    clock: Arc<dyn Clock>,
}

impl AuditService {
    /// Start assembling a service from a configuration.
    pub fn builder(config: AuditServiceConfig) -> AuditServiceBuilder {
        AuditServiceBuilder::new(config)
    }

    /// Assemble a fully in-process service.
    pub fn in_memory(config: AuditServiceConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// The configuration the service was assembled from.
    pub fn config(&self) -> &AuditServiceConfig {
        &self.config
    }

    /// Hash the chain is anchored on.
    pub fn genesis_hash(&self) -> &str {
        self.ledger.hash_engine().genesis_hash()
    }

    /// Normalize one producer payload, append it, and run the immediate
    /// alert check on the new event.
    pub fn ingest(&self, topic: &str, payload: &str) -> Result<IngestOutcome, ServiceError> {
        let record = ProducerRecord::from_topic(topic, payload)?.normalize()?;
        self.ingest_normalized(record)
    }

    /// Append an already normalized record.
    ///
    /// A replayed request id returns the original event and skips the
    /// immediate check; only a genuinely new event can raise an alert.
    pub fn ingest_normalized(
        &self,
        record: NormalizedEvent,
    ) -> Result<IngestOutcome, ServiceError> {
        let appended = self.ledger.append(record)?;
        let duplicate = appended.is_duplicate();
        let event = appended.into_event();
        let immediate_alert = if duplicate {
            None
        } else {
            self.engine.check_immediate(&event)?
        };
        Ok(IngestOutcome {
            event,
            duplicate,
            immediate_alert,
        })
    }

    /// Verify the chain over `[from, to]`, recording a check run.
    ///
    /// A failed walk additionally raises an integrity failure alert keyed
    /// to the recorded run.
    pub fn verify_range(
        &self,
        from: EventId,
        to: EventId,
    ) -> Result<VerificationReport, ServiceError> {
        let report = self.verifier.verify_range(from, to)?;
        if !report.is_ok() {
            if let Some(reason) = report.fail_reason.as_deref() {
                self.engine
                    .create_integrity_failure_alert(report.check_run_id, reason)?;
            }
        }
        Ok(report)
    }

    /// Raise an integrity failure alert for an externally observed break.
    ///
    /// Returns `None` when the failure was already alerted within its
    /// dedup window.
    pub fn create_integrity_failure_alert(
        &self,
        check_run_id: CheckRunId,
        fail_reason: &str,
    ) -> Result<Option<Alert>, ServiceError> {
        Ok(self
            .engine
            .create_integrity_failure_alert(check_run_id, fail_reason)?)
    }

    /// Filtered, ordered, paginated read of the ledger.
    pub fn query_chain(
        &self,
        filter: &EventFilter,
        page: &PageRequest,
    ) -> Result<EventPage, ServiceError> {
        Ok(self.events.query(filter, page)?)
    }

    /// Look up one event by ledger position.
    pub fn find_event(&self, id: EventId) -> Result<Option<AuditEvent>, ServiceError> {
        Ok(self.events.find_by_id(id)?)
    }

    /// All events sharing a trace id, in chain order.
    pub fn trace_events(&self, trace_id: &str) -> Result<Vec<AuditEvent>, ServiceError> {
        Ok(self.events.find_by_trace_id(trace_id)?)
    }

    /// The newest ledgered event.
    pub fn latest_event(&self) -> Result<Option<AuditEvent>, ServiceError> {
        Ok(self.events.latest()?)
    }

    /// Number of ledgered events.
    pub fn event_count(&self) -> Result<u64, ServiceError> {
        Ok(self.events.count()?)
    }

    /// Look up a recorded integrity check run.
    pub fn find_check_run(
        &self,
        id: CheckRunId,
    ) -> Result<Option<IntegrityCheckRun>, ServiceError> {
        Ok(self.runs.find(id)?)
    }

    /// Look up one alert.
    pub fn find_alert(&self, id: AlertId) -> Result<Option<Alert>, ServiceError> {
        Ok(self.alerts.find(id)?)
    }

    /// Alerts in one lifecycle state, most severe and newest first.
    pub fn alerts_with_status(&self, status: AlertStatus) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.alerts.list_by_status(status)?)
    }

    /// Alerts at one severity, newest first.
    pub fn alerts_with_severity(
        &self,
        severity: AlertSeverity,
    ) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.alerts.list_by_severity(severity)?)
    }

    /// Alerts attributed to one actor, newest first.
    pub fn alerts_for_actor(&self, actor_user_id: i64) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.alerts.list_by_actor(actor_user_id)?)
    }

    /// Alerts created strictly after an instant, newest first.
    pub fn alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.alerts.created_after(since)?)
    }

    /// Open, acknowledged and resolved counts.
    pub fn alert_stats(&self) -> Result<AlertStats, ServiceError> {
        Ok(self.alerts.stats()?)
    }

    /// Move an open alert to acknowledged.
    pub fn acknowledge_alert(&self, id: AlertId) -> Result<Alert, ServiceError> {
        Ok(self.alerts.acknowledge(id, self.clock.now())?)
    }

    /// Close out an open or acknowledged alert.
    pub fn resolve_alert(&self, id: AlertId) -> Result<Alert, ServiceError> {
        Ok(self.alerts.resolve(id, self.clock.now())?)
    }

    /// Run one windowed detection pass now.
    pub fn run_detection_pass(&self) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.engine.run_detection_pass()?)
    }

    /// Spawn the periodic detection loop on the current runtime.
    pub fn spawn_detection_loop(&self) -> DetectionLoop {
        DetectionLoop::spawn(Arc::clone(&self.engine))
    }
}
