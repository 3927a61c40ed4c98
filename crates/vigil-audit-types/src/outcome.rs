//! Outcome classification for audited operations.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Result of the operation an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// The operation completed normally.
    Success,
    /// The operation was attempted and failed.
    Failure,
    /// The operation was refused by access control.
    Denied,
}

impl AuditOutcome {
    /// Check whether the outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check whether the outcome records a refused or failed operation.
    pub fn is_negative(&self) -> bool {
        matches!(self, Self::Failure | Self::Denied)
    }
}

impl Default for AuditOutcome {
    fn default() -> Self {
        Self::Success
    }
}
