use std::time::Duration;

use rackgrid_api::{DeviceView, snapshot};
use rackgrid_core::RackConfig;
use tokio::sync::watch;
use tracing::debug;

use crate::wiring;

const WATCH_EVERY: Duration = Duration::from_secs(1);

pub async fn list(config: &RackConfig, probe: bool, format: &str) -> anyhow::Result<()> {
    let ledger = wiring::open_ledger(config)?;
    let scheduler = wiring::scheduler(config, ledger.clone())?;
    if probe {
        scheduler.init().await;
        let report = scheduler.tick().await;
        scheduler.connection().close().await;
        debug!(?report, "one-shot probe finished");
    }

    let views = snapshot(&ledger, scheduler.table()).await?;
    print_views(&views, format, true)
}

/// Run the scheduler and print the snapshot every second until Ctrl-C.
pub async fn watch(config: &RackConfig, format: &str) -> anyhow::Result<()> {
    let ledger = wiring::open_ledger(config)?;
    let scheduler = wiring::scheduler(config, ledger.clone())?;
    let table = scheduler.table().clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(WATCH_EVERY);
    let result = loop {
        tokio::select! {
            _ = ticker.tick() => {
                let printed = match snapshot(&ledger, &table).await {
                    Ok(views) => print_views(&views, format, false),
                    Err(e) => Err(e.into()),
                };
                if let Err(e) = printed {
                    break Err(e);
                }
            }
            signal = &mut ctrl_c => break signal.map_err(anyhow::Error::from),
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = handle.await;
    result
}

fn print_views(views: &[DeviceView], format: &str, pretty: bool) -> anyhow::Result<()> {
    match (format, pretty) {
        ("json", true) => println!("{}", serde_json::to_string_pretty(views)?),
        // One snapshot per line when streaming.
        ("json", false) => println!("{}", serde_json::to_string(views)?),
        _ => println!("{}", render_table(views)),
    }
    Ok(())
}

/// Fixed-width device table. Reservation blocks continue on indented lines.
pub fn render_table(views: &[DeviceView]) -> String {
    const HEADERS: [&str; 6] = ["DEVICE", "MODEL", "MGMT_IP", "TAG", "HEALTH", "RETRIES"];

    let rows: Vec<[String; 6]> = views
        .iter()
        .map(|v| {
            [
                v.record.device_id.clone(),
                v.record.model_name.clone(),
                v.record.mgmt_ip.clone(),
                v.record.tag.to_string(),
                v.health.to_string(),
                v.retry_count.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_line = |cells: &[&str], block: &str| {
        let mut line = String::new();
        for (cell, width) in cells.iter().zip(widths) {
            line.push_str(&format!("{cell:<width$}  "));
        }
        let indent = line.len();
        let mut block_lines = block.lines();
        line.push_str(block_lines.next().unwrap_or_default());
        out.push_str(line.trim_end());
        out.push('\n');
        for extra in block_lines {
            out.push_str(&" ".repeat(indent));
            out.push_str(extra);
            out.push('\n');
        }
    };

    push_line(&HEADERS, "RESERVATION");
    for (row, view) in rows.iter().zip(views) {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        push_line(&cells, &view.resv_block);
    }
    out
}
