//! Delivery engine configuration

use serde::Deserialize;

use crate::rate_limiter::RateLimitConfig;

/// Worker-pool fan-out can never exceed this, whatever the config says.
pub const MAX_CONCURRENCY_CAP: usize = 50;

/// The source queue refuses larger fetch batches.
pub const BATCH_SIZE_CAP: usize = 10;

/// Retry behaviour for one message.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Attempt ceiling per message. Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay. Default: 1000 ms
    #[serde(default = "default_initial_retry_ms")]
    pub initial_retry_ms: u64,

    /// Backoff ceiling. Default: 60000 ms
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_retry_ms: default_initial_retry_ms(),
            max_retry_ms: default_max_retry_ms(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_retry_ms() -> u64 {
    1_000
}

const fn default_max_retry_ms() -> u64 {
    60_000
}

/// Configuration for the delivery core.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Idempotency TTL. Default: 24 hours. The table is per-process; a
    /// restart forgets it.
    #[serde(default = "default_idempotency_window_ms")]
    pub idempotency_window_ms: u64,

    /// Worker pool fan-out. Default: 10, capped at [`MAX_CONCURRENCY_CAP`].
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Queue fetch size. Default: 10, capped at [`BATCH_SIZE_CAP`].
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Safety margin subtracted from the invocation deadline.
    /// Default: 60000 ms
    #[serde(default = "default_drain_buffer_ms")]
    pub drain_buffer_ms: u64,

    /// Consecutive empty polls before the drainer declares the queue
    /// empty. Default: 3
    #[serde(default = "default_empty_poll_threshold")]
    pub empty_poll_threshold: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            idempotency_window_ms: default_idempotency_window_ms(),
            max_concurrency: default_max_concurrency(),
            batch_size: default_batch_size(),
            drain_buffer_ms: default_drain_buffer_ms(),
            empty_poll_threshold: default_empty_poll_threshold(),
        }
    }
}

const fn default_idempotency_window_ms() -> u64 {
    86_400_000
}

const fn default_max_concurrency() -> usize {
    10
}

const fn default_batch_size() -> usize {
    10
}

const fn default_drain_buffer_ms() -> u64 {
    60_000
}

const fn default_empty_poll_threshold() -> u32 {
    3
}

impl DeliveryConfig {
    /// Apply the hard caps. Call once after loading.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_concurrency = self.max_concurrency.clamp(1, MAX_CONCURRENCY_CAP);
        self.batch_size = self.batch_size.clamp(1, BATCH_SIZE_CAP);
        self
    }
}
