//! Alert types raised by the detection engine.

use crate::{AlertId, AlertSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

/// The fixed set of findings the engine can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// A sensitive administrative policy changed.
    AdminPolicyChange,
    /// Repeated login failures for one (email, ip) pair.
    RepeatedFailedLogin,
    /// A burst of denied operations for one (actor, ip) pair.
    DeniedAccessBurst,
    /// Unusually many export requests by one actor.
    ExportSpike,
    /// One actor touching unusually many distinct patients.
    BulkAccess,
    /// The hash chain failed integrity verification.
    AuditChainFail,
}

/// Lifecycle state of an alert, advanced by the operator workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    /// Raised and awaiting triage.
    Open,
    /// An operator has seen the alert.
    Acked,
    /// The finding is closed out.
    Resolved,
}

/// An alert as the engine submits it, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    /// Which finding this is.
    pub alert_type: AlertType,
    /// Engine-assigned severity.
    pub severity: AlertSeverity,
    /// Short operator-facing headline.
    pub title: String,
    /// Longer operator-facing description.
    pub message: String,
    /// Actor the finding concerns, when known.
    pub actor_user_id: Option<i64>,
    /// Actor email, when known.
    pub actor_email: Option<String>,
    /// Source IP, when known.
    pub ip: Option<String>,
    /// Patient context, when the finding concerns one.
    pub patient_id: Option<i64>,
    /// Supporting detail, string keys to scalar values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

/// A stored alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Store-assigned identity.
    pub id: AlertId,
    /// When the alert was raised.
    pub created_at: DateTime<Utc>,
    /// When the alert last changed state.
    pub updated_at: DateTime<Utc>,
    /// Which finding this is.
    pub alert_type: AlertType,
    /// Engine-assigned severity.
    pub severity: AlertSeverity,
    /// Lifecycle state.
    pub status: AlertStatus,
    /// Short operator-facing headline.
    pub title: String,
    /// Longer operator-facing description.
    pub message: String,
    /// Actor the finding concerns, when known.
    pub actor_user_id: Option<i64>,
    /// Actor email, when known.
    pub actor_email: Option<String>,
    /// Source IP, when known.
    pub ip: Option<String>,
    /// Patient context, when the finding concerns one.
    pub patient_id: Option<i64>,
    /// Supporting detail, string keys to scalar values.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl Alert {
    /// Check whether the alert still awaits triage.
    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}
