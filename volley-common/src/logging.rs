//! Tracing initialisation
//!
//! The engine emits structured log lines through `tracing`. Output format
//! is selected with `LOG_FORMAT` (`json` for one JSON object per line,
//! anything else for the compact human format) and the level with
//! `LOG_LEVEL` (`error`/`warn`/`info`/`debug`/`trace`).

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

fn level_from_env() -> LevelFilter {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        match level.to_ascii_lowercase().as_str() {
            "error" => LevelFilter::ERROR,
            "warn" => LevelFilter::WARN,
            "debug" => LevelFilter::DEBUG,
            "trace" => LevelFilter::TRACE,
            _ => LevelFilter::INFO,
        }
    } else if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Install the global subscriber. Call once, at process entry.
pub fn init() {
    let level = level_from_env();
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        Registry::default()
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_filter(level),
            )
            .init();
    } else {
        Registry::default()
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_filter(level),
            )
            .init();
    }
}

/// Subscriber for tests: compact output, never panics if one is already set.
pub fn init_for_tests() {
    let _ = Registry::default()
        .with(fmt::layer().compact().with_test_writer())
        .try_init();
}
