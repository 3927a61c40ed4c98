//! Store-assigned identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a ledgered audit event.
///
/// Assigned by the event store as a dense ascending sequence starting at 1;
/// the chain invariant is expressed over this ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    /// The first id any ledger assigns.
    pub const FIRST: EventId = EventId(1);

    /// Wrap a raw id value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Id of the event immediately preceding this one, if there is one.
    pub fn predecessor(&self) -> Option<EventId> {
        if self.0 > 1 {
            Some(EventId(self.0 - 1))
        } else {
            None
        }
    }

    /// Id of the event immediately following this one.
    pub fn next(&self) -> EventId {
        EventId(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

/// Identifier of a raised alert.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(u64);

impl AlertId {
    /// Wrap a raw id value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlertId({})", self.0)
    }
}

/// Identifier of an integrity check run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckRunId(u64);

impl CheckRunId {
    /// Wrap a raw id value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CheckRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CheckRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckRunId({})", self.0)
    }
}
