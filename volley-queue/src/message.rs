//! Wire-level queue message model

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// A string-valued message attribute, forwarded verbatim to the
/// dead-letter destination as a `{String, StringValue}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    #[serde(rename = "DataType", default = "default_data_type")]
    pub data_type: String,
    #[serde(rename = "StringValue")]
    pub string_value: String,
}

fn default_data_type() -> String {
    "String".to_string()
}

impl AttributeValue {
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: default_data_type(),
            string_value: value.into(),
        }
    }
}

/// One message as fetched from the source queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Backend-assigned message id, stable across redeliveries.
    pub message_id: String,
    /// Opaque receipt handle for this delivery; required to ack.
    pub receipt: String,
    /// UTF-8 body, expected to be JSON.
    pub body: String,
    /// Optional attribute map; `to` and `subject` override body fields.
    pub attributes: AHashMap<String, AttributeValue>,
}

impl QueueMessage {
    /// Attribute lookup returning the raw string value.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|v| v.string_value.as_str())
    }
}
