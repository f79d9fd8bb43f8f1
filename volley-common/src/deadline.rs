//! Per-invocation deadline plumbing
//!
//! A single [`Deadline`] is constructed at entry and threaded down through
//! the drainer, worker pool, and sender. Every blocking call in the engine
//! is bounded by it, so cancellation propagates without a separate channel.

use std::{future::Future, time::Duration};

use tokio::time::Instant;

/// The bounded future did not complete before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExpired;

impl std::fmt::Display for DeadlineExpired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invocation deadline expired")
    }
}

impl std::error::Error for DeadlineExpired {}

/// Absolute point in time bounding one engine invocation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline at an absolute instant.
    #[must_use]
    pub const fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Deadline `budget` from now.
    #[must_use]
    pub fn within(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Shrink the deadline by a safety margin, saturating at "now".
    #[must_use]
    pub fn with_buffer(self, buffer: Duration) -> Self {
        let now = Instant::now();
        Self {
            at: self.at.checked_sub(buffer).map_or(now, |at| at.max(now)),
        }
    }

    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn has_at_least(&self, margin: Duration) -> bool {
        self.remaining() >= margin
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Run a future, aborting it when the deadline passes.
    pub async fn bound<F: Future>(&self, fut: F) -> Result<F::Output, DeadlineExpired> {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| DeadlineExpired)
    }

    /// Deadline-aware sleep. Returns `Err(DeadlineExpired)` if the deadline
    /// cuts the sleep short.
    pub async fn sleep(&self, duration: Duration) -> Result<(), DeadlineExpired> {
        if duration >= self.remaining() {
            tokio::time::sleep_until(self.at).await;
            return Err(DeadlineExpired);
        }
        tokio::time::sleep(duration).await;
        Ok(())
    }
}
