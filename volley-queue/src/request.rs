//! Decoding queue payloads into send requests
//!
//! A queue message body is UTF-8 JSON; `to` and `subject` attributes, when
//! present, override the body fields. The precedence below is part of this
//! parser's contract:
//!
//! - `recipient` := attribute `to` || body `to`
//! - `subject`   := attribute `subject` || body `subject`
//! - `body`      := body `content` || `html` || `text` || `body`
//! - `content_kind` := body `contentType` || (`html` present ? html : text)
//!
//! Unknown body fields are preserved into `metadata` and travel with the
//! request to the dead-letter destination if the send fails permanently.

use std::fmt;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{error::ParseError, message::QueueMessage};

/// How the message body should be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Text,
}

impl ContentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Text => "text",
        }
    }
}

/// SHA-256 over `recipient ":" subject ":" first-100-chars(body)`.
///
/// Used for idempotency keying only; two requests with equal fingerprints
/// submitted within the idempotency window reach SMTP at most once.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    #[must_use]
    pub fn compute(recipient: &str, subject: &str, body: &str) -> Self {
        let head: String = body.chars().take(100).collect();
        let mut hasher = Sha256::new();
        hasher.update(recipient.as_bytes());
        hasher.update(b":");
        hasher.update(subject.as_bytes());
        hasher.update(b":");
        hasher.update(head.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// The decoded payload of one queue message.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub content_kind: ContentKind,
    /// Body fields not consumed by the parser, preserved verbatim.
    pub metadata: Map<String, Value>,
    /// Backend message id of the originating queue message.
    pub queue_message_id: String,
    /// Receipt handle of the originating delivery.
    pub receipt: String,
    pub fingerprint: Fingerprint,
}

const CONTENT_FIELDS: [&str; 4] = ["content", "html", "text", "body"];
const CONSUMED_FIELDS: [&str; 6] = ["to", "subject", "content", "html", "text", "contentType"];

impl SendRequest {
    /// Decode a fetched queue message.
    pub fn parse(message: &QueueMessage) -> Result<Self, ParseError> {
        let parsed: Value = serde_json::from_str(&message.body)
            .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
        let body_obj = parsed.as_object().cloned().unwrap_or_default();

        let field = |key: &str| body_obj.get(key).and_then(Value::as_str);

        let recipient = message
            .attribute("to")
            .or_else(|| field("to"))
            .ok_or(ParseError::MissingRecipient)?
            .to_string();

        let subject = message
            .attribute("subject")
            .or_else(|| field("subject"))
            .ok_or(ParseError::MissingSubject)?
            .to_string();

        let body = CONTENT_FIELDS
            .iter()
            .find_map(|key| field(key))
            .ok_or(ParseError::MissingContent)?
            .to_string();

        let content_kind = match field("contentType") {
            Some(kind) if kind.eq_ignore_ascii_case("html") => ContentKind::Html,
            Some(_) => ContentKind::Text,
            None if body_obj.contains_key("html") => ContentKind::Html,
            None => ContentKind::Text,
        };

        let metadata: Map<String, Value> = body_obj
            .into_iter()
            .filter(|(key, _)| {
                !CONSUMED_FIELDS.contains(&key.as_str()) && key != "body"
            })
            .collect();

        let fingerprint = Fingerprint::compute(&recipient, &subject, &body);

        Ok(Self {
            recipient,
            subject,
            body,
            content_kind,
            metadata,
            queue_message_id: message.message_id.clone(),
            receipt: message.receipt.clone(),
            fingerprint,
        })
    }

    /// Re-encode as a queue body. `parse` of the result preserves
    /// recipient, subject, body, and content kind exactly.
    #[must_use]
    pub fn to_json_body(&self) -> String {
        let mut body = Map::new();
        body.insert("to".to_string(), Value::String(self.recipient.clone()));
        body.insert("subject".to_string(), Value::String(self.subject.clone()));
        body.insert("content".to_string(), Value::String(self.body.clone()));
        body.insert(
            "contentType".to_string(),
            Value::String(self.content_kind.as_str().to_string()),
        );
        for (key, value) in &self.metadata {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(body).to_string()
    }
}

#[cfg(test)]
mod tests {
    use ahash::AHashMap;

    use super::*;
    use crate::message::AttributeValue;

    fn message(body: &str) -> QueueMessage {
        QueueMessage {
            message_id: "m-1".to_string(),
            receipt: "r-1".to_string(),
            body: body.to_string(),
            attributes: AHashMap::new(),
        }
    }

    #[test]
    fn test_parse_body_fields() {
        let msg = message(r#"{"to":"a@x.com","subject":"hi","content":"hello"}"#);
        let request = SendRequest::parse(&msg).unwrap();
        assert_eq!(request.recipient, "a@x.com");
        assert_eq!(request.subject, "hi");
        assert_eq!(request.body, "hello");
        assert_eq!(request.content_kind, ContentKind::Text);
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn test_attributes_override_body() {
        let mut msg = message(r#"{"to":"body@x.com","subject":"body subject","text":"t"}"#);
        msg.attributes
            .insert("to".to_string(), AttributeValue::string("attr@y.com"));
        msg.attributes
            .insert("subject".to_string(), AttributeValue::string("attr subject"));

        let request = SendRequest::parse(&msg).unwrap();
        assert_eq!(request.recipient, "attr@y.com");
        assert_eq!(request.subject, "attr subject");
    }

    #[test]
    fn test_content_field_precedence() {
        let msg = message(
            r#"{"to":"a@x.com","subject":"s","content":"first","html":"<p>second</p>","text":"third"}"#,
        );
        let request = SendRequest::parse(&msg).unwrap();
        assert_eq!(request.body, "first");
    }

    #[test]
    fn test_html_field_implies_html_kind() {
        let msg = message(r#"{"to":"a@x.com","subject":"s","html":"<p>hi</p>"}"#);
        let request = SendRequest::parse(&msg).unwrap();
        assert_eq!(request.content_kind, ContentKind::Html);
        assert_eq!(request.body, "<p>hi</p>");
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let msg = message(r#"{"to":"a@x.com","subject":"s","html":"x","contentType":"text"}"#);
        let request = SendRequest::parse(&msg).unwrap();
        assert_eq!(request.content_kind, ContentKind::Text);
    }

    #[test]
    fn test_unknown_fields_preserved_into_metadata() {
        let msg =
            message(r#"{"to":"a@x.com","subject":"s","text":"t","campaign":"c-9","batch":3}"#);
        let request = SendRequest::parse(&msg).unwrap();
        assert_eq!(
            request.metadata.get("campaign").and_then(Value::as_str),
            Some("c-9")
        );
        assert_eq!(
            request.metadata.get("batch").and_then(Value::as_i64),
            Some(3)
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            SendRequest::parse(&message("not json")),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(
            SendRequest::parse(&message(r#"{"subject":"s","text":"t"}"#)),
            Err(ParseError::MissingRecipient)
        ));
        assert!(matches!(
            SendRequest::parse(&message(r#"{"to":"a@x.com","text":"t"}"#)),
            Err(ParseError::MissingSubject)
        ));
        assert!(matches!(
            SendRequest::parse(&message(r#"{"to":"a@x.com","subject":"s"}"#)),
            Err(ParseError::MissingContent)
        ));
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let msg = message(r#"{"to":"a@x.com","subject":"hi","html":"<b>x</b>","campaign":"c"}"#);
        let original = SendRequest::parse(&msg).unwrap();

        let reparsed = SendRequest::parse(&message(&original.to_json_body())).unwrap();
        assert_eq!(reparsed.recipient, original.recipient);
        assert_eq!(reparsed.subject, original.subject);
        assert_eq!(reparsed.body, original.body);
        assert_eq!(reparsed.content_kind, original.content_kind);
        assert_eq!(reparsed.fingerprint, original.fingerprint);
        assert_eq!(
            reparsed.metadata.get("campaign"),
            original.metadata.get("campaign")
        );
    }

    #[test]
    fn test_fingerprint_uses_first_100_chars() {
        let long_a = format!("{}{}", "a".repeat(100), "tail-one");
        let long_b = format!("{}{}", "a".repeat(100), "tail-two");
        let fp_a = Fingerprint::compute("a@x.com", "s", &long_a);
        let fp_b = Fingerprint::compute("a@x.com", "s", &long_b);
        assert_eq!(fp_a, fp_b);

        let fp_c = Fingerprint::compute("a@x.com", "s", "different");
        assert_ne!(fp_a, fp_c);
    }

    #[test]
    fn test_fingerprint_display_is_hex() {
        let fp = Fingerprint::compute("a@x.com", "s", "b");
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
