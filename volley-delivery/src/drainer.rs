//! Deadline-bounded queue draining
//!
//! Two entries over the same worker pool and sender: [`Drainer::drain`]
//! pulls batches until the queue runs dry or the deadline nears, and
//! [`Drainer::process_batch`] handles a pre-fetched batch once for
//! event-driven callers.

use std::{
    sync::Arc,
    time::Duration,
};

use tokio::time::Instant;
use volley_common::Deadline;
use volley_queue::{MessageQueue, QueueMessage, MAX_WAIT_SECS};

use crate::{
    config::DeliveryConfig,
    error::DeliveryError,
    idempotency::IdempotencyStore,
    rate_limiter::RateLimiter,
    types::{BatchReport, DrainSummary, StoppedReason},
    worker::WorkerPool,
};

/// The loop exits rather than start a cycle with less than this left.
const STOP_MARGIN: Duration = Duration::from_secs(5);

/// Pause between batches, letting provider connections breathe.
const BATCH_BREATHER: Duration = Duration::from_millis(100);

/// Pause after an empty poll.
const EMPTY_POLL_PAUSE: Duration = Duration::from_secs(1);

/// Cool-off after a fetch or dispatch error.
const ERROR_PAUSE: Duration = Duration::from_secs(2);

/// Interval for window eviction and idempotency sweeps.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// The outer controller bounding one invocation by its deadline.
#[derive(Debug)]
pub struct Drainer {
    queue: Arc<dyn MessageQueue>,
    pool: WorkerPool,
    limiter: Arc<RateLimiter>,
    idempotency: Arc<IdempotencyStore>,
    batch_size: usize,
    empty_poll_threshold: u32,
}

impl Drainer {
    #[must_use]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        pool: WorkerPool,
        limiter: Arc<RateLimiter>,
        idempotency: Arc<IdempotencyStore>,
        config: &DeliveryConfig,
    ) -> Self {
        Self {
            queue,
            pool,
            limiter,
            idempotency,
            batch_size: config.batch_size,
            empty_poll_threshold: config.empty_poll_threshold,
        }
    }

    /// Drain until the queue stays empty or the deadline nears.
    ///
    /// A single bad message or a failing fetch never ends the drain; the
    /// loop logs, cools off, and continues.
    pub async fn drain(&self, deadline: Deadline) -> DrainSummary {
        let started = Instant::now();
        let mut summary = DrainSummary::empty(StoppedReason::Timeout);
        let mut empty_polls: u32 = 0;
        let mut last_maintenance = started;

        tracing::info!(
            remaining_ms = deadline.remaining().as_millis() as u64,
            batch_size = self.batch_size,
            "drain starting"
        );

        let stopped_reason = loop {
            if !deadline.has_at_least(STOP_MARGIN) {
                break StoppedReason::Timeout;
            }
            if empty_polls >= self.empty_poll_threshold {
                break StoppedReason::QueueEmpty;
            }

            if last_maintenance.elapsed() >= MAINTENANCE_INTERVAL {
                self.limiter.evict_idle();
                self.idempotency.evict_stale();
                last_maintenance = Instant::now();
            }

            let wait = poll_wait_secs(&deadline);
            match self.queue.fetch(self.batch_size, wait).await {
                Ok(batch) if batch.is_empty() => {
                    empty_polls += 1;
                    tracing::debug!(empty_polls, "queue empty");
                    if deadline.sleep(EMPTY_POLL_PAUSE).await.is_err() {
                        break StoppedReason::Timeout;
                    }
                }
                Ok(batch) => {
                    empty_polls = 0;
                    tracing::debug!(batch = batch.len(), "dispatching batch");
                    let outcomes = self.pool.dispatch(batch, &deadline).await;
                    summary.tally(&outcomes);
                    if deadline.sleep(BATCH_BREATHER).await.is_err() {
                        break StoppedReason::Timeout;
                    }
                }
                Err(error) => {
                    let error = DeliveryError::from(error);
                    tracing::error!(error = %error, "fetch failed, cooling off");
                    if deadline.sleep(ERROR_PAUSE).await.is_err() {
                        break StoppedReason::Timeout;
                    }
                }
            }
        };

        summary.stopped_reason = stopped_reason;
        summary.elapsed_seconds = started.elapsed().as_secs_f64();

        let stats = self.limiter.stats();
        tracing::info!(
            processed = summary.processed,
            failed = summary.failed,
            permanent = summary.permanent,
            elapsed_seconds = summary.elapsed_seconds,
            stopped_reason = ?summary.stopped_reason,
            rate_limiter = %serde_json::to_string(&stats).unwrap_or_default(),
            "drain finished"
        );

        summary
    }

    /// Event-driven entry: dispatch one pre-fetched batch and report the
    /// outcome partition so the caller can surface partial failures.
    pub async fn process_batch(
        &self,
        messages: Vec<QueueMessage>,
        deadline: Deadline,
    ) -> BatchReport {
        tracing::info!(batch = messages.len(), "processing pre-fetched batch");
        let outcomes = self.pool.dispatch(messages, &deadline).await;
        let report = BatchReport::from_outcomes(outcomes);
        if !report.retryable.is_empty() {
            tracing::warn!(
                acked = report.acked.len(),
                retryable = report.retryable.len(),
                "partial batch failure"
            );
        }
        report
    }
}

/// Long-poll wait for the next fetch: one second short of the remaining
/// time, clamped to the queue's 0–20 s long-poll range.
fn poll_wait_secs(deadline: &Deadline) -> u64 {
    let remaining_secs = deadline.remaining().as_secs();
    remaining_secs.saturating_sub(1).min(MAX_WAIT_SECS)
}
