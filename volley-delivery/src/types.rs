//! Outcome and summary types

use serde::Serialize;

/// Why a send was skipped without touching SMTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    IdempotentDuplicate,
}

/// Terminal result of [`crate::Sender::send`] for one request.
///
/// Every request resolves to exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum SendOutcome {
    /// Accepted by the SMTP server.
    Sent { smtp_message_id: String, attempts: u32 },
    /// Suppressed before SMTP; no rate-limit accounting happened.
    Skipped { reason: SkipReason },
    /// Gave up for now; the queue's visibility timeout will redeliver.
    Retryable {
        last_error: String,
        attempts: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        smtp_code: Option<u16>,
    },
    /// Can never succeed; routed to the dead-letter destination.
    Permanent {
        last_error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        smtp_code: Option<u16>,
    },
}

impl SendOutcome {
    /// Whether the originating queue message should be acked. Retryable
    /// outcomes leave the message for redelivery.
    #[must_use]
    pub const fn should_ack(&self) -> bool {
        matches!(
            self,
            Self::Sent { .. } | Self::Skipped { .. } | Self::Permanent { .. }
        )
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Skipped { .. } => "skipped",
            Self::Retryable { .. } => "retryable",
            Self::Permanent { .. } => "permanent",
        }
    }

    /// A retryable outcome for work the deadline cut off before (or
    /// during) an attempt.
    #[must_use]
    pub fn timed_out(attempts: u32) -> Self {
        Self::Retryable {
            last_error: "invocation deadline expired before completion".to_string(),
            attempts,
            smtp_code: None,
        }
    }
}

/// One queue message's terminal outcome for this invocation.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub queue_message_id: String,
    pub outcome: SendOutcome,
}

/// Why a drain loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedReason {
    QueueEmpty,
    Timeout,
}

/// Result of one drain invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DrainSummary {
    /// Messages that reached a successful terminal state (sent or
    /// skipped as a duplicate).
    pub processed: u64,
    /// Messages left for redelivery.
    pub failed: u64,
    /// Messages routed to the dead-letter destination.
    pub permanent: u64,
    pub elapsed_seconds: f64,
    pub stopped_reason: StoppedReason,
}

impl DrainSummary {
    #[must_use]
    pub const fn empty(stopped_reason: StoppedReason) -> Self {
        Self {
            processed: 0,
            failed: 0,
            permanent: 0,
            elapsed_seconds: 0.0,
            stopped_reason,
        }
    }

    /// Fold a batch of outcomes into the counters.
    pub fn tally(&mut self, outcomes: &[MessageOutcome]) {
        for MessageOutcome { outcome, .. } in outcomes {
            match outcome {
                SendOutcome::Sent { .. } | SendOutcome::Skipped { .. } => self.processed += 1,
                SendOutcome::Retryable { .. } => self.failed += 1,
                SendOutcome::Permanent { .. } => self.permanent += 1,
            }
        }
    }
}

/// Partitioned outcomes for the event-driven entry, so callers can report
/// partial-batch failures upstream.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<MessageOutcome>,
    /// Queue message ids that were acked (sent, skipped, or
    /// dead-lettered).
    pub acked: Vec<String>,
    /// Queue message ids left for visibility-timeout redelivery.
    pub retryable: Vec<String>,
}

impl BatchReport {
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<MessageOutcome>) -> Self {
        let (acked, retryable) = outcomes.iter().fold(
            (Vec::new(), Vec::new()),
            |(mut acked, mut retryable), result| {
                if result.outcome.should_ack() {
                    acked.push(result.queue_message_id.clone());
                } else {
                    retryable.push(result.queue_message_id.clone());
                }
                (acked, retryable)
            },
        );
        Self {
            outcomes,
            acked,
            retryable,
        }
    }
}
