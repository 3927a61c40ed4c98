//! Severity vocabularies.
//!
//! Events and alerts carry distinct severity scales: producers label events
//! with [`AuditSeverity`], while the alert engine assigns [`AlertSeverity`]
//! from its own policy tables. The two are not interchangeable.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum::{Display, EnumIter, EnumString};

/// Severity a producer assigns to an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    /// Normal operations.
    Info,
    /// Events that may warrant review.
    Warn,
    /// Events requiring immediate review.
    High,
    /// Critical security events.
    Critical,
}

impl AuditSeverity {
    /// Numeric value for comparison (higher = more severe).
    pub fn level(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Warn => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Check if this severity meets a minimum threshold.
    pub fn meets_threshold(&self, threshold: Self) -> bool {
        self.level() >= threshold.level()
    }
}

impl PartialOrd for AuditSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AuditSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

impl Default for AuditSeverity {
    fn default() -> Self {
        Self::Info
    }
}

/// Severity the alert engine assigns to a raised alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    /// Informational finding.
    Info,
    /// Finding that should be triaged during normal operations.
    #[serde(rename = "MED")]
    #[strum(serialize = "MED")]
    Medium,
    /// Finding requiring prompt attention.
    High,
    /// Finding requiring immediate response.
    Critical,
}

impl AlertSeverity {
    /// Numeric value for comparison (higher = more severe).
    pub fn level(&self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }
}

impl PartialOrd for AlertSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlertSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level().cmp(&other.level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_severity_orders_by_level() {
        assert!(AuditSeverity::Critical > AuditSeverity::High);
        assert!(AuditSeverity::Warn.meets_threshold(AuditSeverity::Info));
        assert!(!AuditSeverity::Info.meets_threshold(AuditSeverity::High));
    }

    #[test]
    fn alert_medium_uses_med_token() {
        assert_eq!(AlertSeverity::Medium.to_string(), "MED");
        assert_eq!(
            AlertSeverity::from_str("MED").expect("parse"),
            AlertSeverity::Medium
        );
        let json = serde_json::to_string(&AlertSeverity::Medium).expect("serialize");
        assert_eq!(json, "\"MED\"");
    }

    #[test]
    fn severity_tokens_round_trip() {
        for sev in [
            AuditSeverity::Info,
            AuditSeverity::Warn,
            AuditSeverity::High,
            AuditSeverity::Critical,
        ] {
            let parsed = AuditSeverity::from_str(&sev.to_string()).expect("parse");
            assert_eq!(parsed, sev);
        }
    }
}
