//! Event records: the normalized input shape and the ledgered entry.

use crate::{AuditOutcome, AuditSeverity, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fully normalized audit event, ready for the ledger.
///
/// This is the single record shape the ledger accepts. Producer payloads in
/// other shapes are mapped onto it by the ingest layer, which also owns all
/// defaulting; by the time a record reaches the ledger every required field
/// is populated. Field names serialize in the producers' camelCase wire
/// form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// When the event happened at the source.
    pub occurred_at: DateTime<Utc>,
    /// Service that emitted the event.
    pub source_service: String,
    /// Instance of the emitting service.
    pub source_instance: Option<String>,
    /// Event classification, usually one of [`crate::event_types`].
    pub event_type: String,
    /// Result of the audited operation.
    pub outcome: AuditOutcome,
    /// Producer-assigned severity.
    pub severity: AuditSeverity,
    /// Acting user, when authenticated.
    pub actor_user_id: Option<i64>,
    /// Role of the acting user.
    pub actor_role: Option<String>,
    /// Email of the acting user or login subject.
    pub actor_email: Option<String>,
    /// Client IP address.
    pub ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// Client device identifier.
    pub device_id: Option<String>,
    /// Server session identifier.
    pub session_id: Option<String>,
    /// Patient whose data was touched.
    pub patient_id: Option<i64>,
    /// Clinical record that was touched.
    pub record_id: Option<i64>,
    /// User the operation was performed on.
    pub target_user_id: Option<i64>,
    /// Producer-unique id making ingestion idempotent.
    pub request_id: String,
    /// Distributed trace id.
    pub trace_id: Option<String>,
    /// Distributed span id.
    pub span_id: Option<String>,
    /// Free-form context, string keys to scalar values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl NormalizedEvent {
    /// Create a builder with the two fields every event must carry.
    pub fn builder(
        event_type: impl Into<String>,
        request_id: impl Into<String>,
    ) -> NormalizedEventBuilder {
        NormalizedEventBuilder::new(event_type, request_id)
    }
}

/// Builder for constructing normalized events directly, without going
/// through the ingest layer. Unset optional fields stay absent; unset
/// required fields take the ingest layer's defaults.
#[derive(Debug)]
pub struct NormalizedEventBuilder {
    event_type: String,
    request_id: String,
    occurred_at: Option<DateTime<Utc>>,
    source_service: Option<String>,
    source_instance: Option<String>,
    outcome: AuditOutcome,
    severity: AuditSeverity,
    actor_user_id: Option<i64>,
    actor_role: Option<String>,
    actor_email: Option<String>,
    ip: Option<String>,
    user_agent: Option<String>,
    device_id: Option<String>,
    session_id: Option<String>,
    patient_id: Option<i64>,
    record_id: Option<i64>,
    target_user_id: Option<i64>,
    trace_id: Option<String>,
    span_id: Option<String>,
    details: BTreeMap<String, serde_json::Value>,
}

impl NormalizedEventBuilder {
    /// Create a new builder.
    pub fn new(event_type: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            request_id: request_id.into(),
            occurred_at: None,
            source_service: None,
            source_instance: None,
            outcome: AuditOutcome::Success,
            severity: AuditSeverity::Info,
            actor_user_id: None,
            actor_role: None,
            actor_email: None,
            ip: None,
            user_agent: None,
            device_id: None,
            session_id: None,
            patient_id: None,
            record_id: None,
            target_user_id: None,
            trace_id: None,
            span_id: None,
            details: BTreeMap::new(),
        }
    }

    /// Set when the event happened (defaults to now).
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Set the emitting service (defaults to `"unknown"`).
    pub fn source_service(mut self, service: impl Into<String>) -> Self {
        self.source_service = Some(service.into());
        self
    }

    /// Set the emitting instance.
    pub fn source_instance(mut self, instance: impl Into<String>) -> Self {
        self.source_instance = Some(instance.into());
        self
    }

    /// Set the outcome (defaults to `SUCCESS`).
    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Set the severity (defaults to `INFO`).
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the acting user.
    pub fn actor_user_id(mut self, id: i64) -> Self {
        self.actor_user_id = Some(id);
        self
    }

    /// Set the actor role.
    pub fn actor_role(mut self, role: impl Into<String>) -> Self {
        self.actor_role = Some(role.into());
        self
    }

    /// Set the actor email.
    pub fn actor_email(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    /// Set the client IP address.
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Set the client user agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set the client device identifier.
    pub fn device_id(mut self, device: impl Into<String>) -> Self {
        self.device_id = Some(device.into());
        self
    }

    /// Set the session identifier.
    pub fn session_id(mut self, session: impl Into<String>) -> Self {
        self.session_id = Some(session.into());
        self
    }

    /// Set the patient context.
    pub fn patient_id(mut self, id: i64) -> Self {
        self.patient_id = Some(id);
        self
    }

    /// Set the record context.
    pub fn record_id(mut self, id: i64) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Set the targeted user.
    pub fn target_user_id(mut self, id: i64) -> Self {
        self.target_user_id = Some(id);
        self
    }

    /// Set the trace id.
    pub fn trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    /// Set the span id.
    pub fn span_id(mut self, id: impl Into<String>) -> Self {
        self.span_id = Some(id.into());
        self
    }

    /// Add one detail entry.
    pub fn detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json) = serde_json::to_value(value) {
            self.details.insert(key.into(), json);
        }
        self
    }

    /// Build the event.
    pub fn build(self) -> NormalizedEvent {
        NormalizedEvent {
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            source_service: self.source_service.unwrap_or_else(|| "unknown".to_string()),
            source_instance: self.source_instance,
            event_type: self.event_type,
            outcome: self.outcome,
            severity: self.severity,
            actor_user_id: self.actor_user_id,
            actor_role: self.actor_role,
            actor_email: self.actor_email,
            ip: self.ip,
            user_agent: self.user_agent,
            device_id: self.device_id,
            session_id: self.session_id,
            patient_id: self.patient_id,
            record_id: self.record_id,
            target_user_id: self.target_user_id,
            request_id: self.request_id,
            trace_id: self.trace_id,
            span_id: self.span_id,
            details: self.details,
        }
    }
}

/// A ledgered audit event: the normalized record plus the fields the store
/// assigns on append. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Position in the ledger, dense and ascending from 1.
    pub id: EventId,
    /// When the ledger accepted the event.
    pub received_at: DateTime<Utc>,
    /// The normalized record as submitted.
    #[serde(flatten)]
    pub record: NormalizedEvent,
    /// Hash of the preceding event, or the genesis hash for the first.
    pub prev_hash: String,
    /// Digest over `prev_hash` and this event's canonical content.
    pub event_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_required_defaults() {
        let event = NormalizedEvent::builder("LOGIN_FAILURE", "req-1").build();
        assert_eq!(event.event_type, "LOGIN_FAILURE");
        assert_eq!(event.request_id, "req-1");
        assert_eq!(event.source_service, "unknown");
        assert_eq!(event.outcome, AuditOutcome::Success);
        assert_eq!(event.severity, AuditSeverity::Info);
        assert!(event.details.is_empty());
    }

    #[test]
    fn builder_sets_context_fields() {
        let event = NormalizedEvent::builder("RECORD_VIEWED", "req-2")
            .source_service("ehr-api")
            .actor_user_id(42)
            .patient_id(7)
            .ip("10.0.0.9")
            .detail("recordSection", "medications")
            .build();
        assert_eq!(event.source_service, "ehr-api");
        assert_eq!(event.actor_user_id, Some(42));
        assert_eq!(event.patient_id, Some(7));
        assert_eq!(
            event.details.get("recordSection"),
            Some(&serde_json::json!("medications"))
        );
    }

    #[test]
    fn normalized_event_serializes_camel_case() {
        let event = NormalizedEvent::builder("LOGOUT", "req-3")
            .actor_user_id(5)
            .build();
        let json = serde_json::to_value(&event).expect("serialize");
        assert!(json.get("eventType").is_some());
        assert!(json.get("requestId").is_some());
        assert!(json.get("actorUserId").is_some());
        assert!(json.get("event_type").is_none());
    }

    #[test]
    fn ledgered_event_flattens_record() {
        let record = NormalizedEvent::builder("LOGIN_SUCCESS", "req-4").build();
        let event = AuditEvent {
            id: EventId::new(1),
            received_at: Utc::now(),
            record,
            prev_hash: "aa".repeat(32),
            event_hash: "bb".repeat(32),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert!(json.get("eventType").is_some());
        assert!(json.get("prevHash").is_some());
        assert!(json.get("record").is_none());
    }
}
