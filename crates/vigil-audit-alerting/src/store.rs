//! Alert persistence surface.
//!
//! The engine writes through [`AlertStore`] and never sees the backing
//! storage. The in-memory implementation exists for embedding and tests;
//! a database-backed store plugs in behind the same trait.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use vigil_audit_types::{Alert, AlertId, AlertSeverity, AlertStatus, NewAlert};

use crate::error::{AlertError, AlertResult};

/// Counts per lifecycle state across the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStats {
    pub open: u64,
    pub acked: u64,
    pub resolved: u64,
}

impl AlertStats {
    /// Alerts across all lifecycle states.
    pub fn total(&self) -> u64 {
        self.open + self.acked + self.resolved
    }
}

/// Storage backend for raised alerts.
///
/// Implementations assign dense ids starting at 1, stamp `created_at` and
/// `updated_at` from the caller-supplied instant, and keep every alert
/// through its lifecycle.
pub trait AlertStore: Send + Sync {
    /// Persist a new alert as OPEN and return it with identity assigned.
    fn create(&self, alert: NewAlert, at: DateTime<Utc>) -> AlertResult<Alert>;

    /// Look up one alert.
    fn find(&self, id: AlertId) -> AlertResult<Option<Alert>>;

    /// Alerts in `status`, most severe first, newest first within a severity.
    fn list_by_status(&self, status: AlertStatus) -> AlertResult<Vec<Alert>>;

    /// Alerts at exactly `severity`, newest first.
    fn list_by_severity(&self, severity: AlertSeverity) -> AlertResult<Vec<Alert>>;

    /// Alerts attributed to `actor_user_id`, newest first.
    fn list_by_actor(&self, actor_user_id: i64) -> AlertResult<Vec<Alert>>;

    /// Alerts created strictly after `since`, newest first.
    fn created_after(&self, since: DateTime<Utc>) -> AlertResult<Vec<Alert>>;

    /// Counts per lifecycle state.
    fn stats(&self) -> AlertResult<AlertStats>;

    /// Move an OPEN alert to ACKED.
    fn acknowledge(&self, id: AlertId, at: DateTime<Utc>) -> AlertResult<Alert>;

    /// Move an OPEN or ACKED alert to RESOLVED.
    fn resolve(&self, id: AlertId, at: DateTime<Utc>) -> AlertResult<Alert>;
}

/// Alert store holding everything in process memory.
#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        id: AlertId,
        to: AlertStatus,
        allowed_from: &[AlertStatus],
        at: DateTime<Utc>,
    ) -> AlertResult<Alert> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AlertError::UnknownAlert { id })?;
        if !allowed_from.contains(&alert.status) {
            return Err(AlertError::InvalidTransition {
                id,
                from: alert.status,
                to,
            });
        }
        alert.status = to;
        alert.updated_at = at;
        Ok(alert.clone())
    }
}

fn severity_then_recency(a: &Alert, b: &Alert) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then(b.created_at.cmp(&a.created_at))
        .then(b.id.cmp(&a.id))
}

fn newest_first(a: &Alert, b: &Alert) -> Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

impl AlertStore for InMemoryAlertStore {
    fn create(&self, alert: NewAlert, at: DateTime<Utc>) -> AlertResult<Alert> {
        let mut alerts = self.alerts.write();
        let stored = Alert {
            id: AlertId::new(alerts.len() as u64 + 1),
            created_at: at,
            updated_at: at,
            alert_type: alert.alert_type,
            severity: alert.severity,
            status: AlertStatus::Open,
            title: alert.title,
            message: alert.message,
            actor_user_id: alert.actor_user_id,
            actor_email: alert.actor_email,
            ip: alert.ip,
            patient_id: alert.patient_id,
            evidence: alert.evidence,
        };
        alerts.push(stored.clone());
        Ok(stored)
    }

    fn find(&self, id: AlertId) -> AlertResult<Option<Alert>> {
        let alerts = self.alerts.read();
        Ok(alerts.iter().find(|a| a.id == id).cloned())
    }

    fn list_by_status(&self, status: AlertStatus) -> AlertResult<Vec<Alert>> {
        let alerts = self.alerts.read();
        let mut matched: Vec<Alert> = alerts
            .iter()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        matched.sort_by(severity_then_recency);
        Ok(matched)
    }

    fn list_by_severity(&self, severity: AlertSeverity) -> AlertResult<Vec<Alert>> {
        let alerts = self.alerts.read();
        let mut matched: Vec<Alert> = alerts
            .iter()
            .filter(|a| a.severity == severity)
            .cloned()
            .collect();
        matched.sort_by(newest_first);
        Ok(matched)
    }

    fn list_by_actor(&self, actor_user_id: i64) -> AlertResult<Vec<Alert>> {
        let alerts = self.alerts.read();
        let mut matched: Vec<Alert> = alerts
            .iter()
            .filter(|a| a.actor_user_id == Some(actor_user_id))
            .cloned()
            .collect();
        matched.sort_by(newest_first);
        Ok(matched)
    }

    fn created_after(&self, since: DateTime<Utc>) -> AlertResult<Vec<Alert>> {
        let alerts = self.alerts.read();
        let mut matched: Vec<Alert> = alerts
            .iter()
            .filter(|a| a.created_at > since)
            .cloned()
            .collect();
        matched.sort_by(newest_first);
        Ok(matched)
    }

    fn stats(&self) -> AlertResult<AlertStats> {
        let alerts = self.alerts.read();
        let mut stats = AlertStats::default();
        for alert in alerts.iter() {
            match alert.status {
                AlertStatus::Open => stats.open += 1,
                AlertStatus::Acked => stats.acked += 1,
                AlertStatus::Resolved => stats.resolved += 1,
            }
        }
        Ok(stats)
    }

    fn acknowledge(&self, id: AlertId, at: DateTime<Utc>) -> AlertResult<Alert> {
        self.transition(id, AlertStatus::Acked, &[AlertStatus::Open], at)
    }

    fn resolve(&self, id: AlertId, at: DateTime<Utc>) -> AlertResult<Alert> {
        self.transition(
            id,
            AlertStatus::Resolved,
            &[AlertStatus::Open, AlertStatus::Acked],
            at,
        )
    }
}
