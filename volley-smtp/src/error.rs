//! Transport-level errors
//!
//! The transport reports *what the wire did*; deciding whether that is
//! retryable belongs to the delivery crate's classifier. Rejections keep
//! their SMTP reply code so the classifier can apply the code table.

use thiserror::Error;

/// Failure submitting a message to the SMTP transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success reply code.
    #[error("smtp {code}: {message}")]
    Rejected { code: u16, message: String },

    /// Connection-level failure: refused, reset, DNS, or TLS.
    #[error("connection failed: {0}")]
    Connection(String),

    /// An operation exceeded its transport timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// An envelope address the server would not even be asked about.
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    /// Transport misconfiguration (bad relay host, TLS parameters).
    #[error("transport configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// The SMTP reply code, when the failure carries one.
    #[must_use]
    pub const fn smtp_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Map a lettre SMTP error, preserving the reply code when present.
    #[must_use]
    pub fn from_lettre(error: &lettre::transport::smtp::Error) -> Self {
        if let Some(code) = error.status() {
            return Self::Rejected {
                code: code.to_string().parse().unwrap_or(0),
                message: error.to_string(),
            };
        }
        if error.is_timeout() {
            return Self::Timeout(error.to_string());
        }
        Self::Connection(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smtp_code_only_on_rejection() {
        let rejected = TransportError::Rejected {
            code: 550,
            message: "no such user".to_string(),
        };
        assert_eq!(rejected.smtp_code(), Some(550));

        let connection = TransportError::Connection("reset".to_string());
        assert_eq!(connection.smtp_code(), None);

        let timeout = TransportError::Timeout("read".to_string());
        assert_eq!(timeout.smtp_code(), None);
    }

    #[test]
    fn test_display_includes_code() {
        let rejected = TransportError::Rejected {
            code: 421,
            message: "try again later".to_string(),
        };
        assert_eq!(rejected.to_string(), "smtp 421: try again later");
    }
}
