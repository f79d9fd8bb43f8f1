//! In-process idempotency table
//!
//! Maps a request fingerprint to the time of its first successful send.
//! An entry suppresses re-sends for the configured window (24 h by
//! default). The table is strictly per-process: it is not persisted and a
//! restart forgets it, so dedup across restarts is best-effort only.
//!
//! Eviction is lazy on lookup plus a periodic sweep driven by the
//! drainer's maintenance tick.

use dashmap::DashMap;
use volley_common::now_unix_ms;
use volley_queue::Fingerprint;

/// Bounded concurrent fingerprint table.
#[derive(Debug)]
pub struct IdempotencyStore {
    window_ms: u64,
    entries: DashMap<Fingerprint, u64>,
}

impl IdempotencyStore {
    #[must_use]
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            entries: DashMap::new(),
        }
    }

    /// Whether this fingerprint already produced a send inside the
    /// window. A stale entry is evicted on the way out.
    pub fn is_duplicate(&self, fingerprint: &Fingerprint) -> bool {
        self.is_duplicate_at(fingerprint, now_unix_ms())
    }

    fn is_duplicate_at(&self, fingerprint: &Fingerprint, now: u64) -> bool {
        let Some(first_sent_at) = self.entries.get(fingerprint).map(|e| *e.value()) else {
            return false;
        };
        if now.saturating_sub(first_sent_at) < self.window_ms {
            true
        } else {
            self.entries
                .remove_if(fingerprint, |_, at| *at == first_sent_at);
            false
        }
    }

    /// Record a successful send. Keeps the earliest timestamp if two
    /// workers race on the same fingerprint.
    pub fn record(&self, fingerprint: Fingerprint) {
        self.record_at(fingerprint, now_unix_ms());
    }

    fn record_at(&self, fingerprint: Fingerprint, now: u64) {
        self.entries
            .entry(fingerprint)
            .and_modify(|at| *at = (*at).min(now))
            .or_insert(now);
    }

    /// Sweep out entries older than the window.
    pub fn evict_stale(&self) {
        let now = now_unix_ms();
        self.entries
            .retain(|_, first_sent_at| now.saturating_sub(*first_sent_at) < self.window_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
