//! Bounded-concurrency dispatch
//!
//! A batch is split into chunks of the configured concurrency; a chunk
//! runs fully in parallel and completes before the next one starts. Each
//! task runs the sender and then takes the queue-side action itself, so
//! a failure in one task never touches its peers.
//!
//! Queue-side action per outcome: ack on `Sent`/`Skipped`; dead-letter
//! then ack on `Permanent` (including parse failures); nothing on
//! `Retryable`, which leaves the message to the queue's visibility
//! timeout.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinSet;
use volley_common::Deadline;
use volley_queue::{MessageQueue, QueueMessage, SendRequest};

use crate::{
    error::DeliveryError,
    sender::Sender,
    types::{MessageOutcome, SendOutcome},
};

/// A chunk is not entered with less remaining time than this.
const MIN_CHUNK_MARGIN: Duration = Duration::from_secs(5);

/// Dispatches fetched messages to the sender with bounded fan-out.
#[derive(Debug)]
pub struct WorkerPool {
    sender: Arc<Sender>,
    queue: Arc<dyn MessageQueue>,
    max_concurrency: usize,
}

impl WorkerPool {
    #[must_use]
    pub fn new(sender: Arc<Sender>, queue: Arc<dyn MessageQueue>, max_concurrency: usize) -> Self {
        Self {
            sender,
            queue,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Process a batch, returning one outcome per message.
    ///
    /// When less than five seconds remain at a chunk boundary, that chunk
    /// and everything after it is marked retryable-without-send; the
    /// messages stay invisible until the queue redelivers them.
    pub async fn dispatch(
        &self,
        batch: Vec<QueueMessage>,
        deadline: &Deadline,
    ) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut remaining = batch.into_iter().peekable();

        while remaining.peek().is_some() {
            let chunk: Vec<QueueMessage> = remaining
                .by_ref()
                .take(self.max_concurrency)
                .collect();

            if !deadline.has_at_least(MIN_CHUNK_MARGIN) {
                tracing::warn!(
                    abandoned = chunk.len() + remaining.len(),
                    remaining_ms = deadline.remaining().as_millis() as u64,
                    "deadline too close, abandoning rest of batch"
                );
                outcomes.extend(chunk.into_iter().map(|message| MessageOutcome {
                    queue_message_id: message.message_id,
                    outcome: SendOutcome::timed_out(0),
                }));
                outcomes.extend(remaining.map(|message| MessageOutcome {
                    queue_message_id: message.message_id,
                    outcome: SendOutcome::timed_out(0),
                }));
                break;
            }

            let mut tasks: JoinSet<MessageOutcome> = JoinSet::new();
            for message in chunk {
                let sender = Arc::clone(&self.sender);
                let queue = Arc::clone(&self.queue);
                let deadline = *deadline;
                tasks.spawn(async move {
                    process_message(&sender, queue.as_ref(), message, &deadline).await
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(outcome) => outcomes.push(outcome),
                    // A panicked task leaves its message unacked; the
                    // visibility timeout redelivers it
                    Err(e) => tracing::error!(error = %e, "worker task failed"),
                }
            }
        }

        outcomes
    }
}

/// Run one message through parse, send, and the queue-side action.
async fn process_message(
    sender: &Sender,
    queue: &dyn MessageQueue,
    message: QueueMessage,
    deadline: &Deadline,
) -> MessageOutcome {
    let queue_message_id = message.message_id.clone();

    let request = match SendRequest::parse(&message) {
        Ok(request) => request,
        Err(error) => {
            let error = DeliveryError::from(error);
            tracing::error!(
                queue_message_id = %queue_message_id,
                error = %error,
                "unparseable message, routing to dead-letter"
            );
            let outcome = SendOutcome::Permanent {
                last_error: error.to_string(),
                smtp_code: None,
            };
            dead_letter_and_ack(queue, &message).await;
            return MessageOutcome {
                queue_message_id,
                outcome,
            };
        }
    };

    let outcome = sender.send(&request, deadline).await;

    match &outcome {
        SendOutcome::Sent { .. } | SendOutcome::Skipped { .. } => {
            ack(queue, &message).await;
        }
        SendOutcome::Permanent { last_error, .. } => {
            tracing::warn!(
                queue_message_id = %queue_message_id,
                recipient = %request.recipient,
                error = %last_error,
                "permanent failure, routing to dead-letter"
            );
            dead_letter_and_ack(queue, &message).await;
        }
        SendOutcome::Retryable { .. } => {
            // Left unacked on purpose: redelivery via visibility timeout
        }
    }

    MessageOutcome {
        queue_message_id,
        outcome,
    }
}

async fn ack(queue: &dyn MessageQueue, message: &QueueMessage) {
    if let Err(error) = queue.ack(&message.receipt).await {
        // The message will come back; the idempotency table suppresses
        // the duplicate send
        tracing::warn!(
            queue_message_id = %message.message_id,
            error = %error,
            "ack failed"
        );
    }
}

async fn dead_letter_and_ack(queue: &dyn MessageQueue, message: &QueueMessage) {
    match queue
        .dead_letter(message.body.clone(), message.attributes.clone())
        .await
    {
        Ok(()) => ack(queue, message).await,
        Err(error) => {
            // Keep the original visible rather than lose it
            tracing::error!(
                queue_message_id = %message.message_id,
                error = %error,
                "dead-letter enqueue failed, leaving original in queue"
            );
        }
    }
}
