//! Component wiring
//!
//! One instance of each subsystem is constructed here at process entry
//! and threaded down explicitly. The queue and the SMTP transport stay
//! behind their traits so tests and alternative backends plug in without
//! touching the wiring.

use std::sync::Arc;

use volley_common::Deadline;
use volley_delivery::{
    BatchReport, DrainSummary, Drainer, IdempotencyStore, RateLimiter, RateLimiterStats, Sender,
    WorkerPool,
};
use volley_queue::{MessageQueue, QueueMessage};
use volley_smtp::MailTransport;

use crate::config::Config;

/// A fully wired delivery engine.
#[derive(Debug)]
pub struct Engine {
    drainer: Drainer,
    limiter: Arc<RateLimiter>,
}

impl Engine {
    /// Construct the engine over the given queue and transport.
    #[must_use]
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        transport: Arc<dyn MailTransport>,
        config: &Config,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.delivery.rate_limit.clone()));
        let idempotency = Arc::new(IdempotencyStore::new(config.delivery.idempotency_window_ms));

        let sender = Arc::new(Sender::new(
            transport,
            Arc::clone(&limiter),
            Arc::clone(&idempotency),
            config.smtp.headers.clone(),
            config.delivery.retry.clone(),
        ));
        let pool = WorkerPool::new(
            sender,
            Arc::clone(&queue),
            config.delivery.max_concurrency,
        );
        let drainer = Drainer::new(queue, pool, Arc::clone(&limiter), idempotency, &config.delivery);

        Self { drainer, limiter }
    }

    /// Deadline-bounded drain of the source queue.
    pub async fn drain(&self, deadline: Deadline) -> DrainSummary {
        self.drainer.drain(deadline).await
    }

    /// Event-driven entry for a pre-fetched batch.
    pub async fn process_batch(
        &self,
        messages: Vec<QueueMessage>,
        deadline: Deadline,
    ) -> BatchReport {
        self.drainer.process_batch(messages, deadline).await
    }

    /// Rate limiter utilization, for reporting.
    #[must_use]
    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.limiter.stats()
    }
}
