//! Outgoing message assembly
//!
//! The engine renders RFC 5322 bytes itself instead of delegating header
//! construction to the transport: `Message-ID` format and `Date` jitter
//! are deliverability levers and must stay under the engine's control.

use chrono::{Duration as ChronoDuration, Utc};
use rand::{distr::Alphanumeric, Rng};

const MESSAGE_ID_ENTROPY: usize = 12;
const DATE_JITTER_SECS: i64 = 30;

/// A `Message-ID` of the form `<{unix_ms}.{12 alphanumerics}@{domain}>`,
/// unique per attempt.
#[must_use]
pub fn generate_message_id(sender_domain: &str) -> String {
    let unix_ms = Utc::now().timestamp_millis();
    let entropy: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_ENTROPY)
        .map(char::from)
        .collect();
    format!("<{unix_ms}.{entropy}@{sender_domain}>")
}

/// RFC 2822 `Date` with uniform jitter in ±30 s around now.
///
/// The perturbation keeps large batches from carrying byte-identical
/// timestamps, which pattern-based filters key on.
#[must_use]
pub fn jittered_date() -> String {
    let jitter_ms = rand::rng().random_range(-DATE_JITTER_SECS * 1000..=DATE_JITTER_SECS * 1000);
    (Utc::now() + ChronoDuration::milliseconds(jitter_ms)).to_rfc2822()
}

/// A fully assembled outgoing message: ordered headers plus body parts.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMail {
    headers: Vec<(String, String)>,
    text_body: Option<String>,
    html_body: Option<String>,
}

impl OutgoingMail {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text_body = Some(text.into());
    }

    pub fn set_html(&mut self, html: impl Into<String>) {
        self.html_body = Some(html.into());
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Render to wire bytes. HTML bodies always go out as
    /// `multipart/alternative` with the plain-text part first.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }

        match (&self.html_body, &self.text_body) {
            (Some(html), text) => {
                let boundary = boundary();
                out.push_str(&format!(
                    "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n\r\n"
                ));
                if let Some(text) = text {
                    out.push_str(&format!("--{boundary}\r\n"));
                    out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
                    out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                    out.push_str(text);
                    out.push_str("\r\n");
                }
                out.push_str(&format!("--{boundary}\r\n"));
                out.push_str("Content-Type: text/html; charset=utf-8\r\n");
                out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                out.push_str(html);
                out.push_str(&format!("\r\n--{boundary}--\r\n"));
            }
            (None, Some(text)) => {
                out.push_str("Content-Type: text/plain; charset=utf-8\r\n");
                out.push_str("Content-Transfer-Encoding: 8bit\r\n\r\n");
                out.push_str(text);
                out.push_str("\r\n");
            }
            (None, None) => out.push_str("\r\n"),
        }

        out.into_bytes()
    }
}

fn boundary() -> String {
    let entropy: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("=_{entropy}")
}
