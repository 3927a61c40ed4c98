//! Threshold-based alert detection over the ledger.
//!
//! Two paths raise alerts. The immediate path inspects every event as it
//! lands and fires on sensitive administrative changes. The scheduled path
//! sweeps the recent ledger for windowed patterns: repeated login
//! failures, denied-access bursts, export spikes and bulk patient access.
//! Both paths deduplicate through TTL claims keyed on the finding, so one
//! noisy actor raises one alert per window instead of hundreds.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use vigil_audit_ledger::EventStore;
use vigil_audit_types::{
    Alert, AlertSeverity, AlertType, AuditEvent, CheckRunId, Clock, NewAlert, SystemClock,
};

use crate::config::AlertConfig;
use crate::dedup::DedupStore;
use crate::error::AlertError;
use crate::publish::{AlertMessage, AlertPublisher};
use crate::store::AlertStore;

/// Detection engine over the audit ledger.
///
/// The engine owns no background task; [`check_immediate`] runs in the
/// append path and [`run_detection_pass`] is driven by a scheduler.
///
/// [`check_immediate`]: AlertEngine::check_immediate
/// [`run_detection_pass`]: AlertEngine::run_detection_pass
pub struct AlertEngine {
    events: Arc<dyn EventStore>,
    alerts: Arc<dyn AlertStore>,
    dedup: Arc<dyn DedupStore>,
    publisher: Arc<dyn AlertPublisher>,
    config: AlertConfig,
    clock: Arc<dyn Clock>,
}

impl AlertEngine {
    /// Create an engine on the system clock.
    pub fn new(
        events: Arc<dyn EventStore>,
        alerts: Arc<dyn AlertStore>,
        dedup: Arc<dyn DedupStore>,
        publisher: Arc<dyn AlertPublisher>,
        config: AlertConfig,
    ) -> Self {
        Self::with_clock(events, alerts, dedup, publisher, config, Arc::new(SystemClock))
    }

    /// Create an engine on an explicit clock.
    pub fn with_clock(
        events: Arc<dyn EventStore>,
        alerts: Arc<dyn AlertStore>,
        dedup: Arc<dyn DedupStore>,
        publisher: Arc<dyn AlertPublisher>,
        config: AlertConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            alerts,
            dedup,
            publisher,
            config,
            clock,
        }
    }

    /// The configuration the engine runs with.
    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Inspect one freshly appended event for conditions that cannot wait
    /// for the next scheduled sweep.
    ///
    /// Policy changes raise immediately; care-team events are logged and
    /// left to the windowed detectors; everything else passes through.
    pub fn check_immediate(&self, event: &AuditEvent) -> Result<Option<Alert>, AlertError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let record = &event.record;
        if self.config.is_policy_change(&record.event_type) {
            return self.raise_policy_change(event);
        }
        if self.config.is_care_event(&record.event_type) {
            info!(
                event_type = %record.event_type,
                actor_user_id = record.actor_user_id,
                patient_id = record.patient_id,
                "care event recorded"
            );
        }
        Ok(None)
    }

    /// Sweep the recent ledger for windowed patterns and drop expired
    /// dedup claims.
    ///
    /// Returns the alerts this pass raised; suppressed findings are
    /// logged at debug and do not appear in the result.
    pub fn run_detection_pass(&self) -> Result<Vec<Alert>, AlertError> {
        if !self.config.enabled {
            return Ok(Vec::new());
        }
        debug!("running scheduled alert detection");

        let mut raised = Vec::new();
        self.detect_repeated_failed_logins(&mut raised)?;
        self.detect_denied_access_bursts(&mut raised)?;
        self.detect_export_spikes(&mut raised)?;
        self.detect_bulk_patient_access(&mut raised)?;
        self.expire_dedup_claims()?;
        Ok(raised)
    }

    /// Raise the critical alert for a failed integrity check.
    ///
    /// This path does not consult the enable switch.
    pub fn create_integrity_failure_alert(
        &self,
        check_run_id: CheckRunId,
        fail_reason: &str,
    ) -> Result<Option<Alert>, AlertError> {
        let run_part = check_run_id.to_string();
        let key = dedup_key(
            AlertType::AuditChainFail,
            &[&run_part, &hour_bucket(self.clock.now())],
        );

        let mut evidence = BTreeMap::new();
        evidence.insert("checkRunId".to_string(), Value::from(check_run_id.value()));
        evidence.insert("failReason".to_string(), Value::from(fail_reason));

        self.raise(
            key,
            self.config.chain_fail_ttl_minutes,
            NewAlert {
                alert_type: AlertType::AuditChainFail,
                severity: AlertSeverity::Critical,
                title: "Audit Chain Integrity Failure".to_string(),
                message: format!("Audit log tamper detection triggered: {fail_reason}"),
                actor_user_id: None,
                actor_email: None,
                ip: None,
                patient_id: None,
                evidence,
            },
        )
    }

    fn raise_policy_change(&self, event: &AuditEvent) -> Result<Option<Alert>, AlertError> {
        let record = &event.record;
        let actor_part = number_or_null(record.actor_user_id);
        let key = dedup_key(
            AlertType::AdminPolicyChange,
            &[
                &record.event_type,
                &actor_part,
                &minute_bucket(record.occurred_at),
            ],
        );

        let actor_label = record
            .actor_email
            .clone()
            .unwrap_or_else(|| number_or_null(record.actor_user_id));

        let mut evidence = BTreeMap::new();
        evidence.insert("eventId".to_string(), Value::from(event.id.value()));
        evidence.insert("eventType".to_string(), Value::from(record.event_type.clone()));
        evidence.insert(
            "occurredAt".to_string(),
            Value::from(timestamp(record.occurred_at)),
        );

        self.raise(
            key,
            self.config.policy_change_ttl_minutes,
            NewAlert {
                alert_type: AlertType::AdminPolicyChange,
                severity: self.config.policy_severity(&record.event_type),
                title: format!("Policy Change Detected: {}", record.event_type),
                message: format!(
                    "User {} performed {} action. Target user: {}, IP: {}",
                    actor_label,
                    record.event_type,
                    number_or_null(record.target_user_id),
                    text_or_null(record.ip.as_deref()),
                ),
                actor_user_id: record.actor_user_id,
                actor_email: record.actor_email.clone(),
                ip: record.ip.clone(),
                patient_id: None,
                evidence,
            },
        )
    }

    fn detect_repeated_failed_logins(&self, raised: &mut Vec<Alert>) -> Result<(), AlertError> {
        let now = self.clock.now();
        let since = now - self.config.failed_login_window();
        let groups = self
            .events
            .login_failure_groups(since, self.config.failed_login_threshold)?;

        for group in groups {
            let email = group.actor_email.as_deref();
            let ip = group.ip.as_deref();
            let key = dedup_key(
                AlertType::RepeatedFailedLogin,
                &[text_or_unknown(email), text_or_unknown(ip), &hour_bucket(now)],
            );

            let mut evidence = BTreeMap::new();
            evidence.insert("failedCount".to_string(), Value::from(group.count));
            evidence.insert("email".to_string(), Value::from(text_or_unknown(email)));
            evidence.insert("ip".to_string(), Value::from(text_or_unknown(ip)));
            evidence.insert(
                "windowMinutes".to_string(),
                Value::from(self.config.failed_login_window_minutes),
            );

            if let Some(alert) = self.raise(
                key,
                self.config.failed_login_ttl_minutes,
                NewAlert {
                    alert_type: AlertType::RepeatedFailedLogin,
                    severity: AlertSeverity::High,
                    title: "Repeated Failed Login Attempts".to_string(),
                    message: format!(
                        "{} failed login attempts from email {}, IP {} in last {} minutes",
                        group.count,
                        text_or_null(email),
                        text_or_null(ip),
                        self.config.failed_login_window_minutes,
                    ),
                    actor_user_id: None,
                    actor_email: group.actor_email.clone(),
                    ip: group.ip.clone(),
                    patient_id: None,
                    evidence,
                },
            )? {
                raised.push(alert);
            }
        }
        Ok(())
    }

    fn detect_denied_access_bursts(&self, raised: &mut Vec<Alert>) -> Result<(), AlertError> {
        let now = self.clock.now();
        let since = now - self.config.denied_access_window();
        let groups = self
            .events
            .denied_access_groups(since, self.config.denied_access_threshold)?;

        for group in groups {
            let ip = group.ip.as_deref();
            let actor_part = group.actor_user_id.to_string();
            let key = dedup_key(
                AlertType::DeniedAccessBurst,
                &[&actor_part, text_or_unknown(ip), &hour_bucket(now)],
            );

            let mut evidence = BTreeMap::new();
            evidence.insert("deniedCount".to_string(), Value::from(group.count));
            evidence.insert("userId".to_string(), Value::from(group.actor_user_id));
            evidence.insert("ip".to_string(), Value::from(text_or_unknown(ip)));
            evidence.insert(
                "windowMinutes".to_string(),
                Value::from(self.config.denied_access_window_minutes),
            );

            if let Some(alert) = self.raise(
                key,
                self.config.denied_access_ttl_minutes,
                NewAlert {
                    alert_type: AlertType::DeniedAccessBurst,
                    severity: AlertSeverity::High,
                    title: "Denied Access Burst Detected".to_string(),
                    message: format!(
                        "{} access denials for user {} from IP {} in last {} minutes",
                        group.count,
                        group.actor_user_id,
                        text_or_null(ip),
                        self.config.denied_access_window_minutes,
                    ),
                    actor_user_id: Some(group.actor_user_id),
                    actor_email: None,
                    ip: group.ip.clone(),
                    patient_id: None,
                    evidence,
                },
            )? {
                raised.push(alert);
            }
        }
        Ok(())
    }

    fn detect_export_spikes(&self, raised: &mut Vec<Alert>) -> Result<(), AlertError> {
        let now = self.clock.now();
        let since = now - self.config.export_spike_window();
        let groups = self
            .events
            .export_request_groups(since, self.config.export_spike_threshold)?;

        for group in groups {
            let actor_part = number_or_null(group.actor_user_id);
            let key = dedup_key(AlertType::ExportSpike, &[&actor_part, &hour_bucket(now)]);

            let mut evidence = BTreeMap::new();
            evidence.insert("exportCount".to_string(), Value::from(group.count));
            evidence.insert(
                "userId".to_string(),
                group.actor_user_id.map_or(Value::Null, Value::from),
            );
            evidence.insert(
                "windowMinutes".to_string(),
                Value::from(self.config.export_spike_window_minutes),
            );

            if let Some(alert) = self.raise(
                key,
                self.config.export_spike_ttl_minutes,
                NewAlert {
                    alert_type: AlertType::ExportSpike,
                    severity: AlertSeverity::High,
                    title: "Unusual Export Activity".to_string(),
                    message: format!(
                        "User {} requested {} exports in last {} minutes",
                        actor_part, group.count, self.config.export_spike_window_minutes,
                    ),
                    actor_user_id: group.actor_user_id,
                    actor_email: None,
                    ip: None,
                    patient_id: None,
                    evidence,
                },
            )? {
                raised.push(alert);
            }
        }
        Ok(())
    }

    fn detect_bulk_patient_access(&self, raised: &mut Vec<Alert>) -> Result<(), AlertError> {
        let now = self.clock.now();
        let since = now - self.config.bulk_access_window();
        let groups = self
            .events
            .bulk_patient_access_groups(since, self.config.bulk_access_patient_threshold)?;

        for group in groups {
            let actor_part = group.actor_user_id.to_string();
            let key = dedup_key(AlertType::BulkAccess, &[&actor_part, &hour_bucket(now)]);

            let mut evidence = BTreeMap::new();
            evidence.insert(
                "uniquePatientCount".to_string(),
                Value::from(group.distinct_patients),
            );
            evidence.insert("userId".to_string(), Value::from(group.actor_user_id));
            evidence.insert(
                "windowMinutes".to_string(),
                Value::from(self.config.bulk_access_window_minutes),
            );

            if let Some(alert) = self.raise(
                key,
                self.config.bulk_access_ttl_minutes,
                NewAlert {
                    alert_type: AlertType::BulkAccess,
                    severity: AlertSeverity::Critical,
                    title: "Bulk Patient Access Detected".to_string(),
                    message: format!(
                        "User {} accessed {} unique patient records in last {} minutes",
                        group.actor_user_id,
                        group.distinct_patients,
                        self.config.bulk_access_window_minutes,
                    ),
                    actor_user_id: Some(group.actor_user_id),
                    actor_email: None,
                    ip: None,
                    patient_id: None,
                    evidence,
                },
            )? {
                raised.push(alert);
            }
        }
        Ok(())
    }

    /// Claim the dedup key, then store, bind and publish.
    ///
    /// The claim happens before the alert exists, so two raisers of the
    /// same finding cannot both create one; the loser skips without side
    /// effects.
    fn raise(
        &self,
        key: String,
        ttl_minutes: u32,
        alert: NewAlert,
    ) -> Result<Option<Alert>, AlertError> {
        let now = self.clock.now();
        let expires_at = now + Duration::minutes(i64::from(ttl_minutes));
        if !self.dedup.claim(&key, now, expires_at)? {
            debug!(dedup_key = %key, "alert suppressed, live dedup claim");
            return Ok(None);
        }

        let alert = self.alerts.create(alert, now)?;
        self.dedup.bind_alert(&key, alert.id)?;
        log_alert(&alert);
        self.publisher.publish(AlertMessage::from_alert(&alert));
        Ok(Some(alert))
    }

    fn expire_dedup_claims(&self) -> Result<(), AlertError> {
        let purged = self.dedup.purge_expired(self.clock.now())?;
        if purged > 0 {
            debug!(purged, "expired dedup claims dropped");
        }
        Ok(())
    }
}

fn log_alert(alert: &Alert) {
    match alert.severity {
        AlertSeverity::Critical => error!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            message = %alert.message,
            "CRITICAL ALERT"
        ),
        AlertSeverity::High | AlertSeverity::Medium => warn!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            message = %alert.message,
            "ALERT"
        ),
        AlertSeverity::Info => info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            message = %alert.message,
            "ALERT"
        ),
    }
}

/// Join an alert type and its discriminating parts into a dedup key.
fn dedup_key(alert_type: AlertType, parts: &[&str]) -> String {
    let mut key = alert_type.to_string();
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

fn minute_bucket(at: DateTime<Utc>) -> String {
    bucket(at, Duration::minutes(1))
}

fn hour_bucket(at: DateTime<Utc>) -> String {
    bucket(at, Duration::hours(1))
}

fn bucket(at: DateTime<Utc>, granularity: Duration) -> String {
    at.duration_trunc(granularity)
        .unwrap_or(at)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn number_or_null(value: Option<i64>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

fn text_or_null(value: Option<&str>) -> &str {
    value.unwrap_or("null")
}

fn text_or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("unknown")
}
