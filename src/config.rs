//! Composed configuration
//!
//! Settings load from an optional TOML file and are then overridden by
//! the recognized environment keys, so deployments can tune the engine
//! without shipping a file.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use volley_delivery::DeliveryConfig;
use volley_smtp::SmtpConfig;

/// Queue backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Visibility timeout for the in-memory backend. Default: 300 s
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    /// Optional seed file for local runs: one JSON message body per
    /// line.
    #[serde(default)]
    pub seed_file: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout_secs(),
            seed_file: None,
        }
    }
}

const fn default_visibility_timeout_secs() -> u64 {
    300
}

/// Root configuration for the engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    /// Load from a TOML file when one is given, otherwise start from
    /// defaults; then apply environment overrides either way.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        config.delivery = config.delivery.clone().normalized();
        Ok(config)
    }

    /// Apply the recognized environment keys over the current values.
    #[allow(clippy::too_many_lines)]
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(value) = env_parse::<u32>("GLOBAL_RATE_PER_SECOND")? {
            self.delivery.rate_limit.global_per_second = value;
        }
        if let Some(value) = env_parse::<u32>("MAX_ATTEMPTS")? {
            self.delivery.retry.max_attempts = value;
        }
        if let Some(value) = env_parse::<u64>("INITIAL_RETRY_MS")? {
            self.delivery.retry.initial_retry_ms = value;
        }
        if let Some(value) = env_parse::<u64>("MAX_RETRY_MS")? {
            self.delivery.retry.max_retry_ms = value;
        }
        if let Some(value) = env_parse::<u64>("IDEMPOTENCY_WINDOW_MS")? {
            self.delivery.idempotency_window_ms = value;
        }
        if let Some(value) = env_parse::<usize>("MAX_CONCURRENCY")? {
            self.delivery.max_concurrency = value;
        }
        if let Some(value) = env_parse::<usize>("BATCH_SIZE")? {
            self.delivery.batch_size = value;
        }
        if let Some(value) = env_parse::<u64>("DRAIN_BUFFER_MS")? {
            self.delivery.drain_buffer_ms = value;
        }
        if let Some(value) = env_parse::<u32>("EMPTY_POLL_THRESHOLD")? {
            self.delivery.empty_poll_threshold = value;
        }

        if let Some(value) = env_string("SMTP_HOST") {
            self.smtp.host = value;
        }
        if let Some(value) = env_parse::<u16>("SMTP_PORT")? {
            self.smtp.port = value;
        }
        if let Some(value) = env_string("SMTP_USERNAME") {
            self.smtp.username = Some(value);
        }
        if let Some(value) = env_string("SMTP_PASSWORD") {
            self.smtp.password = Some(value);
        }
        if let Some(value) = env_parse::<bool>("SMTP_IMPLICIT_TLS")? {
            self.smtp.implicit_tls = value;
        }
        if let Some(value) = env_parse::<u32>("SMTP_MAX_CONNECTIONS")? {
            self.smtp.max_connections = value;
        }
        if let Some(value) = env_parse::<u64>("SMTP_CONNECT_TIMEOUT_SECS")? {
            self.smtp.timeouts.connect_secs = value;
        }
        if let Some(value) = env_parse::<u64>("SMTP_GREETING_TIMEOUT_SECS")? {
            self.smtp.timeouts.greeting_secs = value;
        }
        if let Some(value) = env_parse::<u64>("SMTP_SOCKET_TIMEOUT_SECS")? {
            self.smtp.timeouts.socket_secs = value;
        }

        if let Some(value) = env_string("SMTP_FROM") {
            self.smtp.headers.from = value;
        }
        if let Some(value) = env_string("SMTP_REPLY_TO") {
            self.smtp.headers.reply_to = Some(value);
        }
        if let Some(value) = env_string("SMTP_RETURN_PATH") {
            self.smtp.headers.return_path = Some(value);
        }
        if let Some(value) = env_string("SMTP_LIST_UNSUBSCRIBE") {
            self.smtp.headers.list_unsubscribe = Some(value);
        }
        if let Some(value) = env_string("SMTP_X_MAILER") {
            self.smtp.headers.x_mailer = value;
        }

        if let Some(raw) = env_string("DOMAIN_LIMITS") {
            let limits: ahash::AHashMap<String, u32> = serde_json::from_str(&raw)
                .context("DOMAIN_LIMITS must be a JSON object of domain to per-minute limit")?;
            self.delivery.rate_limit.domain_limits.extend(limits);
        }

        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_string(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
