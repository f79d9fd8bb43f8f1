#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

//! Delivery core
//!
//! Drains a message queue of email-send requests and relays them to SMTP
//! under deliverability discipline. Four subsystems cooperate under one
//! per-invocation deadline:
//!
//! - [`RateLimiter`]: global per-second budget plus per-domain sliding
//!   windows with dynamic cooldowns
//! - [`Sender`]: header assembly, idempotency, classified retries with
//!   exponential backoff
//! - [`WorkerPool`]: bounded-concurrency dispatch with queue-side actions
//! - [`Drainer`]: deadline-bounded fetch loop and the event-driven batch
//!   entry
//!
//! Components are constructed once at process entry and passed down
//! explicitly; nothing in this crate is a hidden singleton.

pub mod backoff;
pub mod config;
pub mod drainer;
pub mod error;
pub mod idempotency;
pub mod rate_limiter;
pub mod sender;
pub mod types;
pub mod worker;

pub use config::{DeliveryConfig, RetryConfig};
pub use drainer::Drainer;
pub use error::DeliveryError;
pub use idempotency::IdempotencyStore;
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateLimiterStats};
pub use sender::Sender;
pub use types::{
    BatchReport, DrainSummary, MessageOutcome, SendOutcome, SkipReason, StoppedReason,
};
pub use worker::WorkerPool;
