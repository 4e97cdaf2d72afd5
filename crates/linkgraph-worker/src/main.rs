//! Binary entrypoint for the propagation worker.
//!
//! Reads change notifications from stdin, one JSON object per line, and
//! propagates each of them. Exits once stdin is closed and every scheduled
//! job has settled. Configuration comes from `LINKGRAPH_*` environment
//! variables (see [`linkgraph_worker::config`]); `RUST_LOG` sets verbosity.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use linkgraph_worker::{ChangeNotification, Config, Engine, WorkerError};

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let engine = Engine::from_config(&config)?;
    let pool = engine.start(config.workers, config.retry_policy());
    tracing::info!(workers = pool.size(), "linkgraph worker started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let change: ChangeNotification = match serde_json::from_str(&line) {
            Ok(change) => change,
            Err(err) => {
                tracing::error!(error = %err, "skipping malformed change notification");
                continue;
            }
        };
        match engine.submit(&change).await {
            Ok(summary) => tracing::info!(
                content_id = %change.content_id,
                jobs = summary.total(),
                "change dispatched"
            ),
            Err(err) => tracing::error!(
                content_id = %change.content_id,
                error_kind = err.kind(),
                error = %err,
                "dispatch failed"
            ),
        }
    }

    engine.wait_idle().await;
    pool.shutdown();
    tracing::info!("all jobs settled, exiting");
    Ok(())
}
