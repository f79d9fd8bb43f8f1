//! Queue adapter errors

use thiserror::Error;

/// Failure talking to the queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Fetching a batch failed.
    #[error("queue fetch failed: {0}")]
    Fetch(String),

    /// Deleting an acknowledged message failed.
    #[error("queue ack failed for receipt {receipt}: {reason}")]
    Ack { receipt: String, reason: String },

    /// Enqueueing to the dead-letter destination failed.
    #[error("dead-letter enqueue failed: {0}")]
    DeadLetter(String),
}

/// A queue message body that cannot be turned into a send request.
///
/// Parse failures are terminal for the message: the drainer routes the
/// original body to the dead-letter destination and acks it.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not valid JSON and no attribute fallback applies.
    #[error("message body is not valid JSON: {0}")]
    InvalidJson(String),

    /// Neither the body nor the attributes name a recipient.
    #[error("message has no recipient (no `to` in body or attributes)")]
    MissingRecipient,

    /// Neither the body nor the attributes carry a subject.
    #[error("message has no subject")]
    MissingSubject,

    /// No usable content field was found in the body.
    #[error("message has no content (none of `content`, `html`, `text`, `body`)")]
    MissingContent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueueError::Ack {
            receipt: "r-1".to_string(),
            reason: "gone".to_string(),
        };
        assert_eq!(err.to_string(), "queue ack failed for receipt r-1: gone");

        let err = ParseError::MissingRecipient;
        assert!(err.to_string().contains("no recipient"));
    }
}
