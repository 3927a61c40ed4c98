//! Normalization error type.

/// Why a producer payload could not become a normalized event.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The payload names no event type, so it cannot be classified or
    /// ledgered. Redelivery will not help; the message should be skipped.
    #[error("event type is missing or empty")]
    MissingEventType,

    /// The message arrived on a topic no schema is registered for.
    #[error("unknown producer topic: {topic}")]
    UnknownTopic {
        /// The unrecognized topic name.
        topic: String,
    },

    /// The payload is not valid JSON for its schema.
    #[error("malformed producer payload: {0}")]
    Payload(#[from] serde_json::Error),
}
