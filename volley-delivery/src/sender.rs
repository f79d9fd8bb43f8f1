//! The SMTP send pipeline
//!
//! One call, one terminal outcome: idempotency gate, rate-limit gate,
//! header assembly, pre-send jitter, then the classified attempt loop
//! with exponential backoff. Rate-limit accounting happens only on
//! success.

use std::{sync::Arc, time::Duration};

use rand::Rng;
use volley_common::{Deadline, Domain};
use volley_queue::{ContentKind, SendRequest};
use volley_smtp::{
    generate_message_id, html_to_text, jittered_date, HeaderConfig, MailEnvelope, MailTransport,
    OutgoingMail,
};

use crate::{
    backoff::backoff_delay,
    config::RetryConfig,
    error::DeliveryError,
    idempotency::IdempotencyStore,
    rate_limiter::RateLimiter,
    types::{SendOutcome, SkipReason},
};

/// Domains that watch inter-message timing closely get a wider pre-send
/// jitter band.
const SLOW_JITTER_DOMAINS: [&str; 2] = ["gmail.com", "googlemail.com"];
const SLOW_JITTER_MS: (u64, u64) = (50, 250);
const FAST_JITTER_MS: (u64, u64) = (0, 100);

/// Sends one request to SMTP under full deliverability discipline.
///
/// One instance per process; workers share it through an `Arc`.
#[derive(Debug)]
pub struct Sender {
    transport: Arc<dyn MailTransport>,
    limiter: Arc<RateLimiter>,
    idempotency: Arc<IdempotencyStore>,
    headers: HeaderConfig,
    retry: RetryConfig,
}

impl Sender {
    #[must_use]
    pub fn new(
        transport: Arc<dyn MailTransport>,
        limiter: Arc<RateLimiter>,
        idempotency: Arc<IdempotencyStore>,
        headers: HeaderConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            idempotency,
            headers,
            retry,
        }
    }

    /// Deliver one request. Always resolves to exactly one outcome; all
    /// sleeps inside are cut short by the deadline.
    pub async fn send(&self, request: &SendRequest, deadline: &Deadline) -> SendOutcome {
        if self.idempotency.is_duplicate(&request.fingerprint) {
            tracing::debug!(
                recipient = %request.recipient,
                fingerprint = %request.fingerprint,
                "duplicate within idempotency window, skipping"
            );
            return SendOutcome::Skipped {
                reason: SkipReason::IdempotentDuplicate,
            };
        }

        let domain = Domain::of_recipient(&request.recipient);

        if deadline
            .bound(self.limiter.wait_until_allowed(&request.recipient))
            .await
            .is_err()
        {
            return SendOutcome::timed_out(0);
        }

        let (text_body, html_body) = match request.content_kind {
            ContentKind::Html => (html_to_text(&request.body), Some(request.body.as_str())),
            ContentKind::Text => (request.body.clone(), None),
        };

        let jitter = pre_send_jitter(&domain);
        if !jitter.is_zero() && deadline.sleep(jitter).await.is_err() {
            return SendOutcome::timed_out(0);
        }

        let envelope = MailEnvelope {
            from: self.envelope_from().to_string(),
            to: request.recipient.clone(),
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            // Message-ID and Date are regenerated so every attempt is
            // unique on the wire
            let (mail, message_id) = self.assemble(request, &text_body, html_body);

            let submitted = deadline
                .bound(self.transport.submit(&envelope, &mail.render()))
                .await;

            let error = match submitted {
                Err(_expired) => return SendOutcome::timed_out(attempt),
                Ok(Ok(())) => {
                    self.idempotency.record(request.fingerprint);
                    self.limiter.record_send(&domain);
                    tracing::info!(
                        recipient = %request.recipient,
                        domain = %domain,
                        smtp_message_id = %message_id,
                        attempts = attempt,
                        "message sent"
                    );
                    return SendOutcome::Sent {
                        smtp_message_id: message_id,
                        attempts: attempt,
                    };
                }
                Ok(Err(error)) => DeliveryError::from(error),
            };

            let smtp_code = error.smtp_code();

            if error.triggers_cooldown() {
                self.limiter.set_default_cooldown(&domain);
            }

            tracing::warn!(
                recipient = %request.recipient,
                domain = %domain,
                attempt,
                smtp_code,
                error = %error,
                retryable = error.is_retryable(),
                "send attempt failed"
            );

            if error.is_permanent() {
                return SendOutcome::Permanent {
                    last_error: error.to_string(),
                    smtp_code,
                };
            }
            if attempt >= self.retry.max_attempts {
                return SendOutcome::Retryable {
                    last_error: error.to_string(),
                    attempts: attempt,
                    smtp_code,
                };
            }
            let delay = backoff_delay(attempt, &self.retry);
            if deadline.sleep(delay).await.is_err() {
                return SendOutcome::timed_out(attempt);
            }
        }
    }

    /// The envelope sender: the configured return path when set,
    /// otherwise the `From` address.
    fn envelope_from(&self) -> &str {
        self.headers
            .return_path
            .as_deref()
            .map_or_else(|| self.headers.from_address(), volley_smtp::config::address_part)
    }

    /// Build the outgoing message for one attempt. Returns the mail and
    /// its `Message-ID`.
    fn assemble(
        &self,
        request: &SendRequest,
        text_body: &str,
        html_body: Option<&str>,
    ) -> (OutgoingMail, String) {
        let message_id = generate_message_id(self.headers.sender_domain());

        let mut mail = OutgoingMail::new();
        mail.push_header("From", &self.headers.from);
        mail.push_header("To", &request.recipient);
        mail.push_header("Subject", &request.subject);
        mail.push_header("Message-ID", &message_id);
        mail.push_header("Date", jittered_date());
        mail.push_header("MIME-Version", "1.0");
        mail.push_header("X-Mailer", &self.headers.x_mailer);

        if let Some(reply_to) = &self.headers.reply_to {
            mail.push_header("Reply-To", reply_to);
        }
        if let Some(return_path) = &self.headers.return_path {
            mail.push_header("Return-Path", return_path);
        }
        if let Some(list_unsubscribe) = &self.headers.list_unsubscribe {
            mail.push_header("List-Unsubscribe", list_unsubscribe);
            mail.push_header("List-Unsubscribe-Post", "List-Unsubscribe=One-Click");
        }
        for (name, value) in &self.headers.extra {
            mail.push_header(name, value);
        }

        mail.set_text(text_body);
        if let Some(html) = html_body {
            mail.set_html(html);
        }

        (mail, message_id)
    }
}

fn pre_send_jitter(domain: &Domain) -> Duration {
    let (lo, hi) = if SLOW_JITTER_DOMAINS.contains(&domain.as_str()) {
        SLOW_JITTER_MS
    } else {
        FAST_JITTER_MS
    };
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use ahash::AHashMap;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use volley_queue::QueueMessage;
    use volley_smtp::TransportError;

    use super::*;
    use crate::rate_limiter::RateLimitConfig;

    /// Transport that plays back a script of responses and records every
    /// submission it sees.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), TransportError>>>,
        submissions: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn push(&self, response: Result<(), TransportError>) {
            self.script.lock().push_back(response);
        }

        fn submission_count(&self) -> usize {
            self.submissions.lock().len()
        }

        fn last_raw(&self) -> String {
            self.submissions.lock().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl MailTransport for ScriptedTransport {
        async fn submit(
            &self,
            envelope: &MailEnvelope,
            raw_message: &[u8],
        ) -> Result<(), TransportError> {
            self.submissions.lock().push((
                envelope.to.clone(),
                String::from_utf8_lossy(raw_message).into_owned(),
            ));
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn request(recipient: &str, subject: &str, body: &str) -> SendRequest {
        let message = QueueMessage {
            message_id: "m-1".to_string(),
            receipt: "r-1".to_string(),
            body: format!(
                r#"{{"to":"{recipient}","subject":"{subject}","content":"{body}"}}"#
            ),
            attributes: AHashMap::new(),
        };
        SendRequest::parse(&message).unwrap()
    }

    fn harness(transport: Arc<ScriptedTransport>) -> (Sender, Arc<RateLimiter>) {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let sender = Sender::new(
            transport,
            Arc::clone(&limiter),
            Arc::new(IdempotencyStore::new(86_400_000)),
            HeaderConfig {
                from: "Volley <no-reply@sender.example>".to_string(),
                list_unsubscribe: Some("<https://sender.example/u>".to_string()),
                ..HeaderConfig::default()
            },
            RetryConfig::default(),
        );
        (sender, limiter)
    }

    fn deadline() -> Deadline {
        Deadline::within(Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_records_and_sends_once() {
        let transport = Arc::new(ScriptedTransport::default());
        let (sender, limiter) = harness(Arc::clone(&transport));

        let outcome = sender.send(&request("a@x.com", "hi", "hello"), &deadline()).await;
        let SendOutcome::Sent { smtp_message_id, attempts } = outcome else {
            panic!("expected Sent, got {outcome:?}");
        };
        assert_eq!(attempts, 1);
        assert!(smtp_message_id.ends_with("@sender.example>"));
        assert_eq!(transport.submission_count(), 1);

        let stats = limiter.stats();
        assert_eq!(stats.global_in_window, 1);
        assert_eq!(stats.domains.len(), 1);
        assert_eq!(stats.domains[0].domain, "x.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_headers_on_the_wire() {
        let transport = Arc::new(ScriptedTransport::default());
        let (sender, _) = harness(Arc::clone(&transport));

        sender.send(&request("a@x.com", "hi", "hello"), &deadline()).await;
        let raw = transport.last_raw();
        assert!(raw.contains("From: Volley <no-reply@sender.example>\r\n"));
        assert!(raw.contains("To: a@x.com\r\n"));
        assert!(raw.contains("Subject: hi\r\n"));
        assert!(raw.contains("MIME-Version: 1.0\r\n"));
        assert!(raw.contains("X-Mailer: volley\r\n"));
        assert!(raw.contains("List-Unsubscribe: <https://sender.example/u>\r\n"));
        assert!(raw.contains("List-Unsubscribe-Post: List-Unsubscribe=One-Click\r\n"));
        assert!(raw.contains("Message-ID: <"));
        assert!(raw.contains("Date: "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_html_request_goes_out_multipart() {
        let transport = Arc::new(ScriptedTransport::default());
        let (sender, _) = harness(Arc::clone(&transport));

        let message = QueueMessage {
            message_id: "m-2".to_string(),
            receipt: "r-2".to_string(),
            body: r#"{"to":"a@x.com","subject":"s","html":"<p>Hello <b>there</b></p>"}"#
                .to_string(),
            attributes: AHashMap::new(),
        };
        let request = SendRequest::parse(&message).unwrap();

        sender.send(&request, &deadline()).await;
        let raw = transport.last_raw();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("<p>Hello <b>there</b></p>"));
        // Synthesized text alternative
        assert!(raw.contains("Hello there"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotent_duplicate_skips_smtp() {
        let transport = Arc::new(ScriptedTransport::default());
        let (sender, limiter) = harness(Arc::clone(&transport));
        let request = request("x@y.com", "hi", "hello");

        let first = sender.send(&request, &deadline()).await;
        assert!(matches!(first, SendOutcome::Sent { .. }));

        let second = sender.send(&request, &deadline()).await;
        assert_eq!(
            second,
            SendOutcome::Skipped {
                reason: SkipReason::IdempotentDuplicate
            }
        );
        assert_eq!(transport.submission_count(), 1);
        // No rate-limit accounting for the skip
        assert_eq!(limiter.stats().global_in_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_bounce_is_permanent_without_retries() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(TransportError::Rejected {
            code: 550,
            message: "5.1.1 no such user".to_string(),
        }));
        let (sender, _) = harness(Arc::clone(&transport));

        let outcome = sender
            .send(&request("nobody@x.com", "hi", "hello"), &deadline())
            .await;
        let SendOutcome::Permanent { smtp_code, last_error } = outcome else {
            panic!("expected Permanent, got {outcome:?}");
        };
        assert_eq!(smtp_code, Some(550));
        assert!(last_error.contains("no such user"));
        assert_eq!(transport.submission_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsendable_envelope_is_permanent() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(TransportError::Address {
            address: "nobody@".to_string(),
            reason: "missing domain".to_string(),
        }));
        let (sender, _) = harness(Arc::clone(&transport));

        let outcome = sender
            .send(&request("nobody@", "hi", "hello"), &deadline())
            .await;
        let SendOutcome::Permanent { smtp_code, last_error } = outcome else {
            panic!("expected Permanent, got {outcome:?}");
        };
        assert_eq!(smtp_code, None);
        assert!(last_error.starts_with("internal error:"));
        // No retries: another attempt cannot fix the envelope
        assert_eq!(transport.submission_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_provider_sets_cooldown_and_exhausts_attempts() {
        let transport = Arc::new(ScriptedTransport::default());
        for _ in 0..3 {
            transport.push(Err(TransportError::Rejected {
                code: 421,
                message: "4.7.0 Try again later".to_string(),
            }));
        }
        let (sender, limiter) = harness(Arc::clone(&transport));

        let outcome = sender
            .send(&request("u@gmail.com", "hi", "hello"), &deadline())
            .await;
        let SendOutcome::Retryable { attempts, smtp_code, .. } = outcome else {
            panic!("expected Retryable, got {outcome:?}");
        };
        assert_eq!(attempts, 3);
        assert_eq!(smtp_code, Some(421));

        let stats = limiter.stats();
        let gmail = stats.domains.iter().find(|d| d.domain == "gmail.com").unwrap();
        assert!(
            gmail.cooldown_remaining_ms > 50_000 && gmail.cooldown_remaining_ms <= 60_000,
            "cooldown was {}ms",
            gmail.cooldown_remaining_ms
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(TransportError::Rejected {
            code: 451,
            message: "greylisted, try again".to_string(),
        }));
        transport.push(Ok(()));
        let (sender, _) = harness(Arc::clone(&transport));

        let started = tokio::time::Instant::now();
        let outcome = sender.send(&request("a@x.com", "hi", "hello"), &deadline()).await;
        let SendOutcome::Sent { attempts, .. } = outcome else {
            panic!("expected Sent, got {outcome:?}");
        };
        assert_eq!(attempts, 2);
        assert_eq!(transport.submission_count(), 2);

        // One backoff in [1000, 1300] ms sits between the attempts
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(1_000) && elapsed <= Duration::from_millis(1_600),
            "elapsed {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_id_unique_per_attempt() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.push(Err(TransportError::Connection("reset".to_string())));
        transport.push(Ok(()));
        let (sender, _) = harness(Arc::clone(&transport));

        sender.send(&request("a@x.com", "hi", "hello"), &deadline()).await;

        let submissions = transport.submissions.lock();
        let id_of = |raw: &str| {
            raw.lines()
                .find(|l| l.starts_with("Message-ID:"))
                .unwrap()
                .to_string()
        };
        assert_ne!(id_of(&submissions[0].1), id_of(&submissions[1].1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_mid_backoff_is_retryable_timeout() {
        let transport = Arc::new(ScriptedTransport::default());
        for _ in 0..3 {
            transport.push(Err(TransportError::Rejected {
                code: 451,
                message: "busy".to_string(),
            }));
        }
        let (sender, _) = harness(Arc::clone(&transport));

        // Enough time for the first attempt but not the first backoff
        let deadline = Deadline::within(Duration::from_millis(700));
        let outcome = sender.send(&request("a@x.com", "hi", "hello"), &deadline).await;
        let SendOutcome::Retryable { attempts, last_error, .. } = outcome else {
            panic!("expected Retryable, got {outcome:?}");
        };
        assert_eq!(attempts, 1);
        assert!(last_error.contains("deadline"));
        assert_eq!(transport.submission_count(), 1);
    }
}
