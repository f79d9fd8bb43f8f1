//! Typed errors and SMTP failure classification
//!
//! Five kinds, matching how each propagates: `Parse` and `Internal`
//! dead-letter, `Transport` and `SmtpTransient` feed the retry loop,
//! `Queue` is logged and never aborts a drain. Classification happens
//! once, in the `From<TransportError>` conversion; the sender branches
//! on the resulting kind.

use thiserror::Error;
use volley_queue::{ParseError, QueueError};
use volley_smtp::TransportError;

/// Reply codes that end a message's life: mailbox unavailable, user not
/// local, storage exceeded.
const PERMANENT_CODES: [u16; 3] = [550, 551, 552];

/// Provider throttling phrasing that marks an error transient even
/// without a usable reply code.
const TRANSIENT_PHRASES: [&str; 5] = [
    "rate limit",
    "too many",
    "quota",
    "exceeded",
    "temporarily deferred",
];

/// Top-level error for delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Bad message payload; routed to dead-letter.
    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),

    /// Network/TLS/timeout below the SMTP dialogue; retryable.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Transient SMTP rejection (4xx, unlisted 5xx, and
    /// throttle-phrased errors without a code).
    #[error("smtp transient failure: {message}")]
    SmtpTransient { code: Option<u16>, message: String },

    /// Permanent SMTP rejection (550/551/552); routed to dead-letter.
    #[error("smtp permanent failure: {message}")]
    SmtpPermanent { code: Option<u16>, message: String },

    /// Queue backend failure.
    #[error("queue failure: {0}")]
    Queue(#[from] QueueError),

    /// Invariant violation or unsendable envelope; logged and
    /// dead-lettered.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Classify an SMTP submission failure.
///
/// The code table:
///
/// | condition | kind |
/// |---|---|
/// | 550, 551, 552 | `SmtpPermanent` |
/// | 421, 450, 451, 452, any other 4xx | `SmtpTransient` |
/// | other 5xx | `SmtpTransient` (server-side, treated as transient) |
/// | no code, throttle-phrased message | `SmtpTransient` |
/// | no code (connection reset, DNS, timeout) | `Transport` |
/// | unparseable envelope address, bad transport config | `Internal` |
impl From<TransportError> for DeliveryError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Rejected { code, message } => {
                if PERMANENT_CODES.contains(&code) {
                    Self::SmtpPermanent {
                        code: Some(code),
                        message,
                    }
                } else {
                    Self::SmtpTransient {
                        code: Some(code),
                        message,
                    }
                }
            }
            TransportError::Connection(_) | TransportError::Timeout(_) => {
                let message = error.to_string();
                if has_transient_phrase(&message) {
                    // The provider is throttling even though the reply
                    // code got swallowed on the way up
                    Self::SmtpTransient {
                        code: None,
                        message,
                    }
                } else {
                    Self::Transport(message)
                }
            }
            // Retrying cannot fix a malformed envelope or a bad
            // transport config; dead-letter instead of spinning
            TransportError::Address { .. } | TransportError::Config(_) => {
                Self::Internal(error.to_string())
            }
        }
    }
}

impl DeliveryError {
    /// The SMTP reply code, when the failure carries one.
    #[must_use]
    pub const fn smtp_code(&self) -> Option<u16> {
        match self {
            Self::SmtpTransient { code, .. } | Self::SmtpPermanent { code, .. } => *code,
            _ => None,
        }
    }

    /// Whether this failure dead-letters the message.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::SmtpPermanent { .. } | Self::Parse(_) | Self::Internal(_)
        )
    }

    /// Whether the message should stay in the queue for another try.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::SmtpTransient { .. } | Self::Queue(_)
        )
    }

    /// Whether the recipient domain signalled throttling hard enough to
    /// warrant a cooldown: reply code 421, or `rate limit` anywhere in
    /// the message (case-insensitive).
    #[must_use]
    pub fn triggers_cooldown(&self) -> bool {
        if self.smtp_code() == Some(421) {
            return true;
        }
        match self {
            Self::Transport(message)
            | Self::SmtpTransient { message, .. }
            | Self::SmtpPermanent { message, .. } => {
                message.to_lowercase().contains("rate limit")
            }
            _ => false,
        }
    }
}

/// Whether the message text alone marks the failure as provider
/// throttling or a transient deferral.
fn has_transient_phrase(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PHRASES.iter().any(|phrase| lower.contains(phrase))
}
