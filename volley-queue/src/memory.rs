//! In-memory queue backend
//!
//! Implements the at-least-once contract for tests and local runs: fetched
//! messages become invisible for a visibility timeout and are redelivered
//! (with a fresh receipt) unless acked. Dead-lettered messages are captured
//! in a sibling list that tests can inspect.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{
    error::QueueError,
    message::{AttributeValue, QueueMessage},
    MessageQueue, MAX_FETCH, MAX_WAIT_SECS,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A message captured by the dead-letter destination.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub body: String,
    pub attributes: AHashMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: AHashMap<String, AttributeValue>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<String, (StoredMessage, Instant)>,
    dead: Vec<DeadLetter>,
    next_id: u64,
    next_receipt: u64,
}

/// In-memory [`MessageQueue`] with visibility-timeout redelivery.
#[derive(Debug)]
pub struct MemoryQueue {
    visibility_timeout: Duration,
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Enqueue a message, returning its id.
    pub fn push(
        &self,
        body: impl Into<String>,
        attributes: AHashMap<String, AttributeValue>,
    ) -> String {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let message_id = format!("msg-{}", inner.next_id);
        inner.pending.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: body.into(),
            attributes,
        });
        message_id
    }

    /// Messages currently visible to a fetch.
    pub fn visible_len(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::reclaim_expired(&mut inner);
        inner.pending.len()
    }

    /// Messages fetched but not yet acked or expired.
    pub fn in_flight_len(&self) -> usize {
        let mut inner = self.inner.lock();
        Self::reclaim_expired(&mut inner);
        inner.in_flight.len()
    }

    /// Snapshot of the dead-letter destination.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().dead.clone()
    }

    fn reclaim_expired(inner: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<String> = inner
            .in_flight
            .iter()
            .filter(|(_, (_, visible_at))| *visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some((message, _)) = inner.in_flight.remove(&receipt) {
                inner.pending.push_back(message);
            }
        }
    }

    fn take_batch(&self, max: usize) -> Vec<QueueMessage> {
        let mut inner = self.inner.lock();
        Self::reclaim_expired(&mut inner);

        let visible_at = Instant::now() + self.visibility_timeout;
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(message) = inner.pending.pop_front() else {
                break;
            };
            inner.next_receipt += 1;
            let receipt = format!("rcpt-{}", inner.next_receipt);
            batch.push(QueueMessage {
                message_id: message.message_id.clone(),
                receipt: receipt.clone(),
                body: message.body.clone(),
                attributes: message.attributes.clone(),
            });
            inner.in_flight.insert(receipt, (message, visible_at));
        }
        batch
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn fetch(&self, max: usize, wait_seconds: u64) -> Result<Vec<QueueMessage>, QueueError> {
        let max = max.clamp(1, MAX_FETCH);
        let wait = Duration::from_secs(wait_seconds.min(MAX_WAIT_SECS));
        let poll_deadline = Instant::now() + wait;

        loop {
            let batch = self.take_batch(max);
            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= poll_deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(POLL_INTERVAL.min(poll_deadline - now)).await;
        }
    }

    async fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.in_flight.remove(receipt).is_some() {
            Ok(())
        } else {
            Err(QueueError::Ack {
                receipt: receipt.to_string(),
                reason: "unknown or expired receipt".to_string(),
            })
        }
    }

    async fn dead_letter(
        &self,
        body: String,
        attributes: AHashMap<String, AttributeValue>,
    ) -> Result<(), QueueError> {
        self.inner.lock().dead.push(DeadLetter { body, attributes });
        Ok(())
    }
}
