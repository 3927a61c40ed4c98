//! Detection thresholds, windows and dedup lifetimes.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use vigil_audit_types::{event_types, AlertSeverity};

/// Tuning for the alert engine.
///
/// Thresholds are minimum counts: a group fires when its count in the
/// trailing window is at or above the threshold. Dedup lifetimes bound how
/// often one finding can re-alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AlertConfig {
    /// Global switch; when off, neither path raises anything.
    pub enabled: bool,
    /// Failed logins per (email, ip) that alert.
    pub failed_login_threshold: u64,
    /// Trailing window for failed logins.
    pub failed_login_window_minutes: u32,
    /// Denied operations per (actor, ip) that alert.
    pub denied_access_threshold: u64,
    /// Trailing window for denied operations.
    pub denied_access_window_minutes: u32,
    /// Export requests per actor that alert.
    pub export_spike_threshold: u64,
    /// Trailing window for export requests.
    pub export_spike_window_minutes: u32,
    /// Distinct patients per actor that alert.
    pub bulk_access_patient_threshold: u64,
    /// Trailing window for patient access.
    pub bulk_access_window_minutes: u32,
    /// Dedup lifetime for policy-change alerts.
    pub policy_change_ttl_minutes: u32,
    /// Dedup lifetime for failed-login alerts.
    pub failed_login_ttl_minutes: u32,
    /// Dedup lifetime for denied-burst alerts.
    pub denied_access_ttl_minutes: u32,
    /// Dedup lifetime for export-spike alerts.
    pub export_spike_ttl_minutes: u32,
    /// Dedup lifetime for bulk-access alerts.
    pub bulk_access_ttl_minutes: u32,
    /// Dedup lifetime for chain-failure alerts.
    pub chain_fail_ttl_minutes: u32,
    /// Event types that alert immediately on ingest.
    pub policy_change_events: BTreeSet<String>,
    /// Care-domain event types that are trace-logged, never alerted.
    pub care_events: BTreeSet<String>,
    /// Per-type severity for policy-change alerts; unlisted types get
    /// [`AlertSeverity::Medium`].
    pub policy_severities: BTreeMap<String, AlertSeverity>,
    /// How often the scheduled detectors run.
    pub detection_period_seconds: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failed_login_threshold: 5,
            failed_login_window_minutes: 5,
            denied_access_threshold: 20,
            denied_access_window_minutes: 5,
            export_spike_threshold: 10,
            export_spike_window_minutes: 10,
            bulk_access_patient_threshold: 50,
            bulk_access_window_minutes: 10,
            policy_change_ttl_minutes: 60,
            failed_login_ttl_minutes: 60,
            denied_access_ttl_minutes: 60,
            export_spike_ttl_minutes: 60,
            bulk_access_ttl_minutes: 120,
            chain_fail_ttl_minutes: 1440,
            policy_change_events: default_policy_change_events(),
            care_events: default_care_events(),
            policy_severities: default_policy_severities(),
            detection_period_seconds: 60,
        }
    }
}

impl AlertConfig {
    /// Whether this event type alerts immediately on ingest.
    pub fn is_policy_change(&self, event_type: &str) -> bool {
        self.policy_change_events.contains(event_type)
    }

    /// Whether this event type is care-domain traffic.
    pub fn is_care_event(&self, event_type: &str) -> bool {
        self.care_events.contains(event_type)
    }

    /// Severity for a policy-change alert on this event type.
    pub fn policy_severity(&self, event_type: &str) -> AlertSeverity {
        self.policy_severities
            .get(event_type)
            .copied()
            .unwrap_or(AlertSeverity::Medium)
    }

    /// Trailing window for the failed-login detector.
    pub fn failed_login_window(&self) -> Duration {
        Duration::minutes(i64::from(self.failed_login_window_minutes))
    }

    /// Trailing window for the denied-burst detector.
    pub fn denied_access_window(&self) -> Duration {
        Duration::minutes(i64::from(self.denied_access_window_minutes))
    }

    /// Trailing window for the export-spike detector.
    pub fn export_spike_window(&self) -> Duration {
        Duration::minutes(i64::from(self.export_spike_window_minutes))
    }

    /// Trailing window for the bulk-access detector.
    pub fn bulk_access_window(&self) -> Duration {
        Duration::minutes(i64::from(self.bulk_access_window_minutes))
    }

    /// How often the scheduled detectors run.
    pub fn detection_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.detection_period_seconds)
    }
}

fn default_policy_change_events() -> BTreeSet<String> {
    [
        event_types::ROLE_CHANGED,
        event_types::MFA_DISABLED,
        event_types::RETENTION_CHANGED,
        event_types::ADMIN_CREATED,
        event_types::ADMIN_DELETED,
        event_types::PERMISSION_CHANGED,
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_care_events() -> BTreeSet<String> {
    [
        event_types::ASSIGNMENT_CREATED,
        event_types::ASSIGNMENT_REMOVED,
        event_types::CONSENT_GRANTED,
        event_types::CONSENT_REVOKED,
        event_types::PATIENT_ACCESSED,
        event_types::RECORD_VIEWED,
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_policy_severities() -> BTreeMap<String, AlertSeverity> {
    [
        (event_types::MFA_DISABLED, AlertSeverity::Critical),
        (event_types::ADMIN_DELETED, AlertSeverity::Critical),
        (event_types::ROLE_CHANGED, AlertSeverity::High),
        (event_types::PERMISSION_CHANGED, AlertSeverity::High),
    ]
    .iter()
    .map(|(t, s)| (t.to_string(), *s))
    .collect()
}
