//! Scripted mock SMTP transport
//!
//! Plays back per-recipient response scripts and records every
//! submission for verification. Unscripted submissions succeed.

use std::collections::VecDeque;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use volley_smtp::{MailEnvelope, MailTransport, TransportError};

/// One recorded submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub from: String,
    pub to: String,
    pub raw: String,
}

/// Mock transport for driving failure scenarios.
#[derive(Debug, Default)]
pub struct MockTransport {
    scripts: Mutex<AHashMap<String, VecDeque<Result<(), TransportError>>>>,
    submissions: Mutex<Vec<Submission>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response for submissions to `recipient`. Responses
    /// play back in order; once the script runs dry, submissions succeed.
    pub fn script(&self, recipient: &str, response: Result<(), TransportError>) {
        self.scripts
            .lock()
            .entry(recipient.to_string())
            .or_default()
            .push_back(response);
    }

    /// Shorthand for scripting an SMTP rejection.
    pub fn script_rejection(&self, recipient: &str, code: u16, message: &str) {
        self.script(
            recipient,
            Err(TransportError::Rejected {
                code,
                message: message.to_string(),
            }),
        );
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn submissions_to(&self, recipient: &str) -> usize {
        self.submissions
            .lock()
            .iter()
            .filter(|s| s.to == recipient)
            .count()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn submit(
        &self,
        envelope: &MailEnvelope,
        raw_message: &[u8],
    ) -> Result<(), TransportError> {
        self.submissions.lock().push(Submission {
            from: envelope.from.clone(),
            to: envelope.to.clone(),
            raw: String::from_utf8_lossy(raw_message).into_owned(),
        });
        self.scripts
            .lock()
            .get_mut(&envelope.to)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}
