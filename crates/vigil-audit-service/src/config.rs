//! Service configuration and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_audit_alerting::AlertConfig;
use vigil_audit_ledger::DEFAULT_CHUNK_SIZE;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration document could not be parsed.
    #[error("invalid config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration parsed but cannot produce a working service.
    #[error("validation error: {message}")]
    ValidationError {
        /// What was wrong.
        message: String,
    },
}

/// Settings for an assembled audit service.
///
/// Every field has a default; a config document only needs the keys it
/// overrides. Validation runs before any component is built, so a bad
/// document never gets far enough to accept an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuditServiceConfig {
    /// Operator seed the genesis hash is derived from. Changing it
    /// invalidates every chain built on the old seed.
    pub genesis_seed: String,
    /// Events loaded per store read during verification walks.
    pub verifier_chunk_size: usize,
    /// Thresholds, windows and dedup TTLs for the alert engine.
    pub alerts: AlertConfig,
}

impl Default for AuditServiceConfig {
    fn default() -> Self {
        Self {
            genesis_seed: "vigil-audit-genesis".to_string(),
            verifier_chunk_size: DEFAULT_CHUNK_SIZE,
            alerts: AlertConfig::default(),
        }
    }
}

impl AuditServiceConfig {
    /// Parse a JSON configuration document and validate it.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field the service cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.genesis_seed.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "genesis-seed must not be empty".to_string(),
            });
        }

        if self.verifier_chunk_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "verifier-chunk-size must be greater than 0".to_string(),
            });
        }

        let a = &self.alerts;
        let counts = [
            ("alerts.failed-login-threshold", a.failed_login_threshold),
            ("alerts.denied-access-threshold", a.denied_access_threshold),
            ("alerts.export-spike-threshold", a.export_spike_threshold),
            (
                "alerts.bulk-access-patient-threshold",
                a.bulk_access_patient_threshold,
            ),
            ("alerts.detection-period-seconds", a.detection_period_seconds),
        ];
        for (key, value) in counts {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("{key} must be greater than 0"),
                });
            }
        }

        let minutes = [
            ("alerts.failed-login-window-minutes", a.failed_login_window_minutes),
            ("alerts.denied-access-window-minutes", a.denied_access_window_minutes),
            ("alerts.export-spike-window-minutes", a.export_spike_window_minutes),
            ("alerts.bulk-access-window-minutes", a.bulk_access_window_minutes),
            ("alerts.policy-change-ttl-minutes", a.policy_change_ttl_minutes),
            ("alerts.failed-login-ttl-minutes", a.failed_login_ttl_minutes),
            ("alerts.denied-access-ttl-minutes", a.denied_access_ttl_minutes),
            ("alerts.export-spike-ttl-minutes", a.export_spike_ttl_minutes),
            ("alerts.bulk-access-ttl-minutes", a.bulk_access_ttl_minutes),
            ("alerts.chain-fail-ttl-minutes", a.chain_fail_ttl_minutes),
        ];
        for (key, value) in minutes {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    message: format!("{key} must be greater than 0"),
                });
            }
        }

        Ok(())
    }
}
