//! Integrity check run records.

use crate::{CheckRunId, EventId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// State of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumIter, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    /// The walk is in progress.
    Running,
    /// The range verified intact.
    Ok,
    /// A mismatch was found, or the range could not be verified.
    Fail,
}

impl CheckStatus {
    /// Check whether the run has been finalized.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One verification attempt over a contiguous id range.
///
/// Created in `RUNNING` state before the walk starts and finalized exactly
/// once with `OK` or `FAIL`. On failure the expected and found hashes plus a
/// human-readable reason record what broke; `last_verified_id` is the last
/// event proven intact, absent when the very first event in range failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityCheckRun {
    /// Store-assigned identity.
    pub id: CheckRunId,
    /// When the walk started.
    pub started_at: DateTime<Utc>,
    /// When the run was finalized, absent while running.
    pub finished_at: Option<DateTime<Utc>>,
    /// First event id in the requested range.
    pub from_event_id: EventId,
    /// Last event id in the requested range.
    pub to_event_id: EventId,
    /// Lifecycle state.
    pub status: CheckStatus,
    /// Last event id proven intact.
    pub last_verified_event_id: Option<EventId>,
    /// Hash the walk expected at the point of failure.
    pub expected_hash: Option<String>,
    /// Hash actually stored at the point of failure.
    pub found_hash: Option<String>,
    /// Human-readable failure description.
    pub fail_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tokens_are_stable() {
        assert_eq!(CheckStatus::Running.to_string(), "RUNNING");
        assert_eq!(CheckStatus::Ok.to_string(), "OK");
        assert_eq!(CheckStatus::Fail.to_string(), "FAIL");
    }

    #[test]
    fn running_is_not_final() {
        assert!(!CheckStatus::Running.is_final());
        assert!(CheckStatus::Ok.is_final());
        assert!(CheckStatus::Fail.is_final());
    }
}
