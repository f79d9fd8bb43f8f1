use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use volley::{seed, Config, Engine};
use volley_common::{logging, now_unix_ms, Deadline};
use volley_queue::MemoryQueue;
use volley_smtp::SmtpPool;

/// Remaining budget when the invocation names no deadline.
const DEFAULT_BUDGET_MS: u64 = 300_000;

#[derive(Debug, Default)]
struct Invocation {
    config_path: Option<PathBuf>,
    /// Absolute deadline, unix milliseconds.
    deadline_unix_ms: Option<u64>,
    /// Remaining budget, milliseconds.
    budget_ms: Option<u64>,
}

fn parse_args() -> anyhow::Result<Invocation> {
    let mut invocation = Invocation {
        config_path: std::env::var("VOLLEY_CONFIG").ok().map(PathBuf::from),
        deadline_unix_ms: None,
        budget_ms: std::env::var("VOLLEY_BUDGET_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("VOLLEY_BUDGET_MS must be an integer")?,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "--config" => invocation.config_path = Some(PathBuf::from(value("--config")?)),
            "--deadline-ms" => {
                invocation.deadline_unix_ms = Some(
                    value("--deadline-ms")?
                        .parse()
                        .context("--deadline-ms must be unix milliseconds")?,
                );
            }
            "--budget-ms" => {
                invocation.budget_ms = Some(
                    value("--budget-ms")?
                        .parse()
                        .context("--budget-ms must be an integer")?,
                );
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(invocation)
}

impl Invocation {
    /// Remaining time for this invocation. An absolute deadline wins
    /// over a relative budget.
    fn remaining(&self) -> Duration {
        let ms = self
            .deadline_unix_ms
            .map(|at| at.saturating_sub(now_unix_ms()))
            .or(self.budget_ms)
            .unwrap_or(DEFAULT_BUDGET_MS);
        Duration::from_millis(ms)
    }
}

async fn run() -> anyhow::Result<()> {
    let invocation = parse_args()?;
    let config = Config::load(invocation.config_path.as_deref())?;

    let queue = Arc::new(MemoryQueue::new(Duration::from_secs(
        config.queue.visibility_timeout_secs,
    )));
    if let Some(seed_file) = &config.queue.seed_file {
        let count = seed::load_seed_file(&queue, std::path::Path::new(seed_file))?;
        tracing::info!(count, seed_file, "queue seeded");
    }

    let transport = Arc::new(SmtpPool::connect(&config.smtp)?);
    let engine = Engine::new(queue, transport, &config);

    let deadline = Deadline::within(invocation.remaining())
        .with_buffer(Duration::from_millis(config.delivery.drain_buffer_ms));

    tokio::select! {
        summary = engine.drain(deadline) => {
            println!("{}", serde_json::to_string(&summary)?);
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, abandoning drain");
            anyhow::bail!("interrupted by signal")
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "handler failed");
            ExitCode::FAILURE
        }
    }
}
