//! Shared fixtures for delivery integration tests
#![allow(dead_code)] // Test utility module - not all helpers used in every test

pub mod mock_transport;

use std::{sync::Arc, time::Duration};

use ahash::AHashMap;
use volley_queue::MemoryQueue;
use volley_smtp::HeaderConfig;

use volley_delivery::{
    DeliveryConfig, Drainer, IdempotencyStore, RateLimiter, Sender, WorkerPool,
};

use self::mock_transport::MockTransport;

/// A fully wired engine over the in-memory queue and a mock transport.
pub struct Engine {
    pub queue: Arc<MemoryQueue>,
    pub transport: Arc<MockTransport>,
    pub limiter: Arc<RateLimiter>,
    pub idempotency: Arc<IdempotencyStore>,
    pub drainer: Drainer,
}

impl Engine {
    pub fn new(config: DeliveryConfig) -> Self {
        Self::with_transport(config, Arc::new(MockTransport::new()))
    }

    pub fn with_transport(config: DeliveryConfig, transport: Arc<MockTransport>) -> Self {
        let config = config.normalized();
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(300)));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let idempotency = Arc::new(IdempotencyStore::new(config.idempotency_window_ms));

        let transport_seam: Arc<dyn volley_smtp::MailTransport> = transport.clone();
        let queue_seam: Arc<dyn volley_queue::MessageQueue> = queue.clone();

        let sender = Arc::new(Sender::new(
            transport_seam,
            Arc::clone(&limiter),
            Arc::clone(&idempotency),
            HeaderConfig {
                from: "Volley <no-reply@sender.example>".to_string(),
                ..HeaderConfig::default()
            },
            config.retry.clone(),
        ));
        let pool = WorkerPool::new(sender, Arc::clone(&queue_seam), config.max_concurrency);
        let drainer = Drainer::new(
            queue_seam,
            pool,
            Arc::clone(&limiter),
            Arc::clone(&idempotency),
            &config,
        );

        Self {
            queue,
            transport,
            limiter,
            idempotency,
            drainer,
        }
    }

    /// Enqueue a plain-text message.
    pub fn enqueue(&self, recipient: &str, subject: &str, body: &str) {
        self.queue.push(
            format!(r#"{{"to":"{recipient}","subject":"{subject}","content":"{body}"}}"#),
            AHashMap::new(),
        );
    }
}
