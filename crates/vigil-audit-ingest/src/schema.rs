//! Producer schemas and their normalization into the ledger record shape.

use crate::NormalizeError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;
use vigil_audit_types::{event_types, AuditOutcome, AuditSeverity, NormalizedEvent};

/// Topic the direct audit feed publishes on.
pub const TOPIC_AUDIT_EVENTS: &str = "audit-events";
/// Topic the identity service publishes registrations on.
pub const TOPIC_USER_REGISTERED: &str = "user-registered";
/// Topic the care service publishes assignments on.
pub const TOPIC_PATIENT_ASSIGN: &str = "patient-assign";

/// Source recorded for producers that do not name themselves.
const DEFAULT_SOURCE_SERVICE: &str = "care-service";

/// One producer message, in whichever schema its feed uses.
///
/// Payloads off a shared stream are self-describing through the `schema`
/// tag; transport consumers that already know the topic route with
/// [`ProducerRecord::from_topic`] instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "schema")]
pub enum ProducerRecord {
    /// Direct audit feed, already speaking the ledger's vocabulary.
    #[serde(rename = "audit-events")]
    AuditFeed(AuditFeedRecord),
    /// Registration feed from the identity service.
    #[serde(rename = "user-registered")]
    UserRegistered(UserRegisteredRecord),
    /// Care-team assignment feed from the care service.
    #[serde(rename = "patient-assign")]
    PatientAssign(PatientAssignRecord),
}

impl ProducerRecord {
    /// Parse a payload according to the topic it arrived on.
    pub fn from_topic(topic: &str, payload: &str) -> Result<Self, NormalizeError> {
        debug!(topic = %topic, "decoding producer payload");
        match topic {
            TOPIC_AUDIT_EVENTS => Ok(Self::AuditFeed(serde_json::from_str(payload)?)),
            TOPIC_USER_REGISTERED => Ok(Self::UserRegistered(serde_json::from_str(payload)?)),
            TOPIC_PATIENT_ASSIGN => Ok(Self::PatientAssign(serde_json::from_str(payload)?)),
            other => Err(NormalizeError::UnknownTopic {
                topic: other.to_string(),
            }),
        }
    }

    /// Normalize into the single record shape the ledger accepts.
    pub fn normalize(self) -> Result<NormalizedEvent, NormalizeError> {
        match self {
            Self::AuditFeed(record) => record.normalize(),
            Self::UserRegistered(record) => Ok(record.normalize()),
            Self::PatientAssign(record) => Ok(record.normalize()),
        }
    }
}

/// Envelope fields every producer payload may carry. All default when
/// absent: the request id is synthesized, the timestamp falls back to
/// receipt time, severity to `INFO` and outcome to `SUCCESS`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerEnvelope {
    /// Producer-unique idempotency key.
    pub request_id: Option<String>,
    /// When the event happened at the source.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Emitting service name.
    pub source_service: Option<String>,
    /// Emitting instance or hostname.
    pub source_instance: Option<String>,
    /// Producer-asserted severity.
    pub severity: Option<AuditSeverity>,
    /// Result of the audited operation.
    pub outcome: Option<AuditOutcome>,
}

/// A record from the direct audit feed.
///
/// This feed carries the full ledger field set. Older care-service
/// producers send `doctorUserId`/`role` instead of the actor fields;
/// normalization folds those in as fallbacks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditFeedRecord {
    /// Event classification; records without one are rejected.
    pub event_type: Option<String>,
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: ProducerEnvelope,
    /// Acting user.
    pub actor_user_id: Option<i64>,
    /// Clinician id, older feed form of the actor id.
    pub doctor_user_id: Option<i64>,
    /// Role of the acting user.
    pub actor_role: Option<String>,
    /// Older feed form of the actor role.
    pub role: Option<String>,
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
    /// Distributed trace id.
    pub trace_id: Option<String>,
    /// Distributed span id.
    pub span_id: Option<String>,
    /// Free-form context map.
    pub details: Option<BTreeMap<String, Value>>,
}

impl AuditFeedRecord {
    /// Validate and normalize, applying the feed defaults.
    pub fn normalize(self) -> Result<NormalizedEvent, NormalizeError> {
        let event_type = match self.event_type.filter(|t| !t.is_empty()) {
            Some(event_type) => event_type,
            None => return Err(NormalizeError::MissingEventType),
        };
        let ProducerEnvelope {
            request_id,
            occurred_at,
            source_service,
            source_instance,
            severity,
            outcome,
        } = self.envelope;

        Ok(NormalizedEvent {
            occurred_at: occurred_at.unwrap_or_else(Utc::now),
            source_service: effective_source_service(source_service),
            source_instance,
            event_type,
            outcome: outcome.unwrap_or_default(),
            severity: severity.unwrap_or_default(),
            actor_user_id: self.actor_user_id.or(self.doctor_user_id),
            actor_role: non_empty(self.actor_role).or(self.role),
            actor_email: self.actor_email,
            ip: self.ip,
            user_agent: self.user_agent,
            device_id: self.device_id,
            session_id: self.session_id,
            patient_id: self.patient_id,
            record_id: self.record_id,
            target_user_id: self.target_user_id,
            request_id: effective_request_id(request_id),
            trace_id: self.trace_id,
            span_id: self.span_id,
            details: self.details.unwrap_or_default(),
        })
    }
}

/// A registration event from the identity service.
///
/// The payload carries no event type of its own; normalization synthesizes
/// `USER_REGISTERED` and keeps the original fields in the details map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRegisteredRecord {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: ProducerEnvelope,
    /// Display name of the new user.
    pub user_name: Option<String>,
    /// Email of the new user, recorded as the actor email.
    pub user_email: Option<String>,
    /// Role granted at registration.
    pub role: Option<String>,
}

impl UserRegisteredRecord {
    /// Normalize into a `USER_REGISTERED` event.
    pub fn normalize(self) -> NormalizedEvent {
        let ProducerEnvelope {
            request_id,
            occurred_at,
            source_service,
            source_instance,
            severity,
            outcome,
        } = self.envelope;

        let mut details = BTreeMap::new();
        details.insert("userName".to_string(), detail_text(&self.user_name));
        details.insert("userEmail".to_string(), detail_text(&self.user_email));
        details.insert("role".to_string(), detail_text(&self.role));

        NormalizedEvent {
            occurred_at: occurred_at.unwrap_or_else(Utc::now),
            source_service: effective_source_service(source_service),
            source_instance,
            event_type: event_types::USER_REGISTERED.to_string(),
            outcome: outcome.unwrap_or_default(),
            severity: severity.unwrap_or_default(),
            actor_user_id: None,
            actor_role: self.role,
            actor_email: self.user_email,
            ip: None,
            user_agent: None,
            device_id: None,
            session_id: None,
            patient_id: None,
            record_id: None,
            target_user_id: None,
            request_id: effective_request_id(request_id),
            trace_id: None,
            span_id: None,
            details,
        }
    }
}

/// A care-team assignment event from the care service.
///
/// Normalization synthesizes `PATIENT_ASSIGNED` with the assigning doctor
/// as the actor and keeps the original fields in the details map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatientAssignRecord {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: ProducerEnvelope,
    /// Patient being assigned.
    pub patient_id: Option<i64>,
    /// Display name of the patient.
    pub patient_name: Option<String>,
    /// Doctor receiving the assignment, recorded as the actor.
    pub doctor_id: Option<i64>,
    /// Email of the doctor.
    pub doctor_email: Option<String>,
}

impl PatientAssignRecord {
    /// Normalize into a `PATIENT_ASSIGNED` event.
    pub fn normalize(self) -> NormalizedEvent {
        let ProducerEnvelope {
            request_id,
            occurred_at,
            source_service,
            source_instance,
            severity,
            outcome,
        } = self.envelope;

        let mut details = BTreeMap::new();
        details.insert("patientId".to_string(), detail_number(self.patient_id));
        details.insert("patientName".to_string(), detail_text(&self.patient_name));
        details.insert("doctorId".to_string(), detail_number(self.doctor_id));
        details.insert("doctorEmail".to_string(), detail_text(&self.doctor_email));

        NormalizedEvent {
            occurred_at: occurred_at.unwrap_or_else(Utc::now),
            source_service: effective_source_service(source_service),
            source_instance,
            event_type: event_types::PATIENT_ASSIGNED.to_string(),
            outcome: outcome.unwrap_or_default(),
            severity: severity.unwrap_or_default(),
            actor_user_id: self.doctor_id,
            actor_role: None,
            actor_email: self.doctor_email,
            ip: None,
            user_agent: None,
            device_id: None,
            session_id: None,
            patient_id: self.patient_id,
            record_id: None,
            target_user_id: None,
            request_id: effective_request_id(request_id),
            trace_id: None,
            span_id: None,
            details,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn effective_request_id(request_id: Option<String>) -> String {
    non_empty(request_id).unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn effective_source_service(source_service: Option<String>) -> String {
    non_empty(source_service).unwrap_or_else(|| DEFAULT_SOURCE_SERVICE.to_string())
}

fn detail_text(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn detail_number(value: Option<i64>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}
