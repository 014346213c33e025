// =============================================================================
// RSI Alert — Main Entry Point
// =============================================================================
//
// One run: load config, fetch closes for every asset, compute RSI-14 / RSI-6,
// classify, build a single alert and push it to every configured provider.
//
// Exit code 0 means the run completed, even if some or all deliveries failed.
// Only setup failures (bad config, HTTP client construction) exit non-zero.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod indicators;
mod market_data;
mod notify;
mod pipeline;
mod report;
mod retry;
mod runtime_config;
mod signals;
mod types;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::notify::NotificationDispatcher;
use crate::pipeline::Pipeline;
use crate::runtime_config::{AppConfig, DEFAULT_CONFIG_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── 2. Config ────────────────────────────────────────────────────────
    let config_path =
        std::env::var("RSI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = AppConfig::load_or_default(&config_path)?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    config
        .validate()
        .context("configuration rejected, nothing was processed")?;

    info!(
        source = %config.source,
        interval = config.interval_label(),
        assets = config.assets.len(),
        lookback = config.lookback(),
        asset_delay_secs = config.asset_delay().as_secs(),
        endpoints = config.endpoints.len(),
        "RSI alert starting"
    );

    // ── 3. Collaborators ─────────────────────────────────────────────────
    let source = market_data::build_source(&config)?;
    let dispatcher = NotificationDispatcher::new()?;

    // ── 4. Run ───────────────────────────────────────────────────────────
    let summary = Pipeline::new(&config, source.as_ref(), &dispatcher)
        .run()
        .await;

    println!("{}", report::render_summary(&summary.reports));
    println!("{}\n\n{}", summary.payload.title, summary.payload.body);

    if !summary.dispatched() {
        info!("run finished, nothing to notify");
    } else if summary.delivered() {
        let delivered = summary.outcomes.iter().filter(|o| o.success).count();
        info!(delivered, total = summary.outcomes.len(), "run finished");
    } else {
        warn!("run finished, but every notification provider failed");
    }

    Ok(())
}
