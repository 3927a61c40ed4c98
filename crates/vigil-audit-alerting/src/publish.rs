//! Alert delivery to downstream consumers.
//!
//! Raising an alert and delivering it are decoupled: the engine persists
//! first, then hands the wire form to an [`AlertPublisher`]. Delivery is
//! fire and forget, so a slow or broken sink never blocks detection and a
//! failed publish never rolls back a stored alert.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_audit_types::{Alert, AlertId, AlertSeverity, AlertStatus, AlertType};

/// Wire form of an alert, as downstream notification consumers see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    pub alert_id: AlertId,
    pub created_at: DateTime<Utc>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub title: String,
    pub message: String,
    pub actor_user_id: Option<i64>,
    pub actor_email: Option<String>,
    pub ip: Option<String>,
    pub patient_id: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: BTreeMap<String, serde_json::Value>,
}

impl AlertMessage {
    /// Build the wire form of a stored alert.
    pub fn from_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id,
            created_at: alert.created_at,
            alert_type: alert.alert_type,
            severity: alert.severity,
            status: alert.status,
            title: alert.title.clone(),
            message: alert.message.clone(),
            actor_user_id: alert.actor_user_id,
            actor_email: alert.actor_email.clone(),
            ip: alert.ip.clone(),
            patient_id: alert.patient_id,
            evidence: alert.evidence.clone(),
        }
    }

    /// Partitioning key for downstream transports, one partition per
    /// alert type with the id as a tiebreaker.
    pub fn routing_key(&self) -> String {
        format!("{}-{}", self.alert_type, self.alert_id)
    }
}

/// Sink for raised alerts.
pub trait AlertPublisher: Send + Sync {
    /// Hand one alert to the sink. Implementations log their own
    /// failures instead of surfacing them.
    fn publish(&self, message: AlertMessage);
}

/// Publisher that only writes the alert to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl AlertPublisher for LogPublisher {
    fn publish(&self, message: AlertMessage) {
        info!(
            routing_key = %message.routing_key(),
            severity = %message.severity,
            title = %message.title,
            "alert published"
        );
    }
}

/// Publisher that forwards alerts over a bounded channel.
///
/// The paired receiver belongs to whatever transport the embedder runs,
/// a message broker bridge or a test harness.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<AlertMessage>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiver end of its channel.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<AlertMessage>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }
}

impl AlertPublisher for ChannelPublisher {
    fn publish(&self, message: AlertMessage) {
        let routing_key = message.routing_key();
        match self.sender.try_send(message) {
            Ok(()) => debug!(routing_key = %routing_key, "alert forwarded"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(routing_key = %routing_key, "alert channel full, alert dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(routing_key = %routing_key, "alert channel closed");
            }
        }
    }
}
