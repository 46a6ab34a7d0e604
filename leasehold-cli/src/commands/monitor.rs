//! Pool monitor command - log pool state until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use leasehold_core::{Catalog, CatalogConfig};
use tracing::info;

#[derive(Parser, Debug)]
pub struct MonitorArgs {
    /// Sampling interval in milliseconds (defaults to the config value)
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Warn when more connections than this are checked out
    #[arg(long)]
    pub warn_above: Option<usize>,
}

/// Force the monitor on and apply CLI overrides.
pub fn configure(config: &mut CatalogConfig, args: &MonitorArgs) {
    config.monitor.enabled = true;
    if let Some(ms) = args.interval_ms {
        config.monitor.interval_ms = ms;
    }
    if let Some(n) = args.warn_above {
        config.monitor.warn_active_above = Some(n);
    }
}

pub async fn run_monitor(catalog: &Catalog) -> Result<()> {
    let Some(handle) = catalog.spawn_monitor() else {
        return Ok(());
    };
    info!("monitoring pool, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    let samples = handle.samples();
    handle.shutdown().await;
    println!("{}", serde_json::json!({ "samples": samples, "pool": catalog.pool_state() }));
    Ok(())
}
