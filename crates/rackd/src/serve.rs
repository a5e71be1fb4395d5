//! `rackd serve`: the long-running health scheduler.

use std::time::Duration;

use rackgrid_core::RackConfig;
use rackgrid_health::HealthTable;
use tokio::sync::watch;
use tracing::info;

use crate::wiring;

pub async fn run(config: RackConfig, summary_interval: u64) -> anyhow::Result<()> {
    info!("rackgrid daemon starting");

    let ledger = wiring::open_ledger(&config)?;
    info!(path = ?config.store.path, "device table opened");

    let scheduler = wiring::scheduler(&config, ledger)?;
    let table = scheduler.table().clone();

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let summary_shutdown = shutdown_rx.clone();

    // ── Background tasks ───────────────────────────────────────

    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));
    let summary_handle = tokio::spawn(log_summaries(
        table,
        Duration::from_secs(summary_interval.max(1)),
        summary_shutdown,
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = scheduler_handle.await;
    let _ = summary_handle.await;

    info!("rackgrid daemon stopped");
    Ok(())
}

async fn log_summaries(table: HealthTable, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    // The first tick fires immediately, before anything was probed.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = table.summary().await;
                info!(up = summary.up, down = summary.down, unknown = summary.unknown, "health summary");
            }
            _ = shutdown.changed() => break,
        }
    }
}
