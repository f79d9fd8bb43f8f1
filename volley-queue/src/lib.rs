#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

//! Queue adapter for the delivery engine
//!
//! The source queue is an external at-least-once queue with
//! visibility-timeout semantics and a dead-letter sibling. This crate owns
//! the seam: the [`MessageQueue`] trait, the wire-level [`QueueMessage`]
//! model, parsing of message payloads into [`SendRequest`]s, and an
//! in-memory backend used by tests and local runs.

pub mod error;
pub mod memory;
pub mod message;
pub mod request;

pub use error::{ParseError, QueueError};
pub use memory::{DeadLetter, MemoryQueue};
pub use message::{AttributeValue, QueueMessage};
pub use request::{ContentKind, Fingerprint, SendRequest};

use async_trait::async_trait;

/// Hard cap on a single fetch, matching the source queue's batch limit.
pub const MAX_FETCH: usize = 10;

/// Hard cap on long-poll wait, in seconds.
pub const MAX_WAIT_SECS: u64 = 20;

/// Abstraction over the external message queue.
///
/// Implementations must provide at-least-once delivery: a fetched message
/// stays invisible for the backend's visibility timeout and reappears
/// unless [`MessageQueue::ack`] removes it. `dead_letter` enqueues to the
/// sibling dead-letter destination; the caller acks the original
/// afterwards.
#[async_trait]
pub trait MessageQueue: Send + Sync + std::fmt::Debug {
    /// Fetch up to `max` messages (capped at [`MAX_FETCH`]), long-polling
    /// for at most `wait_seconds` (capped at [`MAX_WAIT_SECS`]).
    async fn fetch(&self, max: usize, wait_seconds: u64) -> Result<Vec<QueueMessage>, QueueError>;

    /// Remove a message from the source queue.
    async fn ack(&self, receipt: &str) -> Result<(), QueueError>;

    /// Enqueue a message body and its attributes to the dead-letter
    /// destination.
    async fn dead_letter(
        &self,
        body: String,
        attributes: ahash::AHashMap<String, AttributeValue>,
    ) -> Result<(), QueueError>;
}
