//! Two-tier send rate limiting with dynamic cooldowns
//!
//! Two ceilings apply to every send attempt: a global per-second budget
//! and a per-recipient-domain per-minute window. A domain that signals
//! throttling additionally gets a cooldown, a hard block that outranks
//! the sliding window while it lasts.
//!
//! Window state is an append-only sequence of send timestamps, pruned to
//! the window on every access; pruning cost is bounded by the window
//! size. Each domain has its own mutex, the global window a separate one,
//! so contention stays per-domain.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use volley_common::{now_unix_ms, Domain};

const GLOBAL_WINDOW_MS: u64 = 1_000;
const DOMAIN_WINDOW_MS: u64 = 60_000;

/// Provider thresholds that drive the per-minute table. These are the
/// operative values, not examples; overriding them is a config decision.
const BUILTIN_DOMAIN_LIMITS: [(&str, u32); 8] = [
    ("gmail.com", 15),
    ("googlemail.com", 15),
    ("outlook.com", 20),
    ("hotmail.com", 20),
    ("live.com", 20),
    ("msn.com", 20),
    ("yahoo.com", 25),
    ("aol.com", 25),
];

const DEFAULT_DOMAIN_LIMIT: u32 = 30;

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Global send ceiling per second. Default: 35
    #[serde(default = "default_global_per_second")]
    pub global_per_second: u32,

    /// Cooldown applied when a provider signals throttling.
    /// Default: 60 seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Per-domain per-minute overrides, merged over the builtin table.
    /// The reserved `"default"` key replaces the fallback limit.
    #[serde(default)]
    pub domain_limits: AHashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_per_second: default_global_per_second(),
            cooldown_secs: default_cooldown_secs(),
            domain_limits: AHashMap::default(),
        }
    }
}

const fn default_global_per_second() -> u32 {
    35
}

const fn default_cooldown_secs() -> u64 {
    60
}

#[derive(Debug, Default)]
struct DomainState {
    /// Send timestamps (unix ms), appended and pruned, never reordered.
    window: VecDeque<u64>,
    /// Hard block until this instant, when set and in the future.
    cooldown_until: Option<u64>,
}

/// Global-plus-per-domain rate limiter. One instance per process, shared
/// by every worker.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    global: Mutex<VecDeque<u64>>,
    domains: DashMap<Domain, Arc<Mutex<DomainState>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            global: Mutex::new(VecDeque::new()),
            domains: DashMap::new(),
        }
    }

    /// Per-minute limit for a domain: config override, then builtin
    /// table, then the default entry.
    #[must_use]
    pub fn per_minute_limit(&self, domain: &Domain) -> u32 {
        if let Some(limit) = self.config.domain_limits.get(domain.as_str()) {
            return *limit;
        }
        BUILTIN_DOMAIN_LIMITS
            .iter()
            .find(|(name, _)| *name == domain.as_str())
            .map_or_else(
                || {
                    self.config
                        .domain_limits
                        .get("default")
                        .copied()
                        .unwrap_or(DEFAULT_DOMAIN_LIMIT)
                },
                |(_, limit)| *limit,
            )
    }

    /// Complete when it is permissible to attempt a send to `recipient`.
    ///
    /// Computes the global wait and the domain wait once, sleeps the
    /// maximum of the two, and returns; callers invoke once per attempt
    /// and are not required to re-check after waking.
    pub async fn wait_until_allowed(&self, recipient: &str) {
        let domain = Domain::of_recipient(recipient);
        let now = now_unix_ms();

        let global_wait = self.global_wait_at(now);
        let domain_wait = self.domain_wait_at(&domain, now);
        let wait_ms = global_wait.max(domain_wait);

        if wait_ms > 0 {
            tracing::debug!(
                domain = %domain,
                wait_ms,
                global_wait_ms = global_wait,
                domain_wait_ms = domain_wait,
                "rate limited, waiting"
            );
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    /// Record a successful send for `domain` at the current instant.
    pub fn record_send(&self, domain: &Domain) {
        let now = now_unix_ms();
        {
            let mut global = self.global.lock();
            prune(&mut global, now, GLOBAL_WINDOW_MS);
            global.push_back(now);
        }
        let state = self.domain_state(domain);
        let mut state = state.lock();
        prune(&mut state.window, now, DOMAIN_WINDOW_MS);
        state.window.push_back(now);
    }

    /// Hard-block a domain for `duration`, replacing any earlier
    /// cooldown.
    pub fn set_cooldown(&self, domain: &Domain, duration: Duration) {
        let until = now_unix_ms() + u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let state = self.domain_state(domain);
        state.lock().cooldown_until = Some(until);
        tracing::warn!(domain = %domain, cooldown_ms = duration.as_millis() as u64, "domain cooldown set");
    }

    /// Cooldown with the configured default duration.
    pub fn set_default_cooldown(&self, domain: &Domain) {
        self.set_cooldown(domain, Duration::from_secs(self.config.cooldown_secs));
    }

    pub fn clear_cooldown(&self, domain: &Domain) {
        if let Some(state) = self.domains.get(domain) {
            state.lock().cooldown_until = None;
        }
    }

    /// Drop domain states with an empty window and no live cooldown.
    /// Called from the drainer's maintenance tick, about once a minute.
    pub fn evict_idle(&self) {
        let now = now_unix_ms();
        self.domains.retain(|_, state| {
            let mut state = state.lock();
            prune(&mut state.window, now, DOMAIN_WINDOW_MS);
            let cooldown_live = state.cooldown_until.is_some_and(|until| until > now);
            !state.window.is_empty() || cooldown_live
        });
    }

    /// Current window occupancy, per domain and global.
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let now = now_unix_ms();
        let global_in_window = {
            let mut global = self.global.lock();
            prune(&mut global, now, GLOBAL_WINDOW_MS);
            global.len()
        };

        let mut domains: Vec<DomainStats> = self
            .domains
            .iter()
            .map(|entry| {
                let mut state = entry.value().lock();
                prune(&mut state.window, now, DOMAIN_WINDOW_MS);
                DomainStats {
                    domain: entry.key().to_string(),
                    in_window: state.window.len(),
                    per_minute_limit: self.per_minute_limit(entry.key()),
                    cooldown_remaining_ms: state
                        .cooldown_until
                        .map_or(0, |until| until.saturating_sub(now)),
                }
            })
            .collect();
        domains.sort_by(|a, b| a.domain.cmp(&b.domain));

        RateLimiterStats {
            global_in_window,
            global_per_second: self.config.global_per_second,
            domains,
        }
    }

    fn domain_state(&self, domain: &Domain) -> Arc<Mutex<DomainState>> {
        self.domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DomainState::default())))
            .clone()
    }

    /// Milliseconds until the global window admits another send.
    fn global_wait_at(&self, now: u64) -> u64 {
        let mut global = self.global.lock();
        prune(&mut global, now, GLOBAL_WINDOW_MS);
        if global.len() < self.config.global_per_second as usize {
            return 0;
        }
        global
            .front()
            .map_or(0, |oldest| (oldest + GLOBAL_WINDOW_MS).saturating_sub(now))
    }

    /// Milliseconds until `domain` admits another send. An active
    /// cooldown outranks the sliding window; an expired one is cleared
    /// in passing.
    fn domain_wait_at(&self, domain: &Domain, now: u64) -> u64 {
        let state = self.domain_state(domain);
        let mut state = state.lock();

        if let Some(until) = state.cooldown_until {
            if until > now {
                return until - now;
            }
            state.cooldown_until = None;
        }

        prune(&mut state.window, now, DOMAIN_WINDOW_MS);
        if state.window.len() < self.per_minute_limit(domain) as usize {
            return 0;
        }
        state
            .window
            .front()
            .map_or(0, |oldest| (oldest + DOMAIN_WINDOW_MS).saturating_sub(now))
    }
}

/// Drop timestamps that fell out of the window ending at `now`.
fn prune(window: &mut VecDeque<u64>, now: u64, window_ms: u64) {
    let cutoff = now.saturating_sub(window_ms);
    while window.front().is_some_and(|ts| *ts <= cutoff) {
        window.pop_front();
    }
}

/// Utilization snapshot for logging and debugging.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub global_in_window: usize,
    pub global_per_second: u32,
    pub domains: Vec<DomainStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub in_window: usize,
    pub per_minute_limit: u32,
    pub cooldown_remaining_ms: u64,
}
