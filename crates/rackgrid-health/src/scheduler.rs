//! HealthScheduler: adaptive per-device polling over the shared session.
//!
//! Each tick collects the devices whose next check is due, reads the
//! ledger once, and probes the due devices one after another on a single
//! [`SessionGuard`](crate::SessionGuard). Cadence per device follows
//! [`HealthState`](crate::HealthState): healthy devices are checked every
//! `up_interval`, failing devices every `down_interval` until
//! `max_retries` consecutive failures.
//!
//! [`HealthScheduler::run`] drives ticks until shutdown. Each tick runs in
//! its own task. A panic inside a tick closes the session, and polling
//! resumes after the reconnect backoff.

use std::sync::Arc;

use parking_lot::Mutex;
use rackgrid_core::IP_PLACEHOLDER;
use rackgrid_state::{DeviceLedger, DeviceRecord, StateError, StateResult};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::RemoteChannel;
use crate::checker::{SchedulePolicy, is_probeable};
use crate::connection::ConnectionManager;
use crate::error::ChannelError;
use crate::table::HealthTable;

/// Shell command template run once per device, with `{ip}` substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    template: String,
}

impl ProbeCommand {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Command line for `ip`. Only validated addresses are rendered.
    pub fn render(&self, ip: &str) -> String {
        self.template.replace(IP_PLACEHOLDER, ip.trim())
    }
}

impl Default for ProbeCommand {
    fn default() -> Self {
        Self::new("ping -c 1 -W 1 {ip}")
    }
}

/// Read every ledger row on the blocking pool.
///
/// The table lock may be held by another process for up to its timeout;
/// that wait must not occupy a runtime worker.
pub async fn read_devices(ledger: &DeviceLedger) -> StateResult<Vec<DeviceRecord>> {
    let ledger = ledger.clone();
    match tokio::task::spawn_blocking(move || ledger.list()).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(StateError::Read(format!("ledger read cancelled: {e}"))),
    }
}

/// Outcome counts of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Devices due at the start of the tick (after any resync).
    pub due: usize,
    pub up: usize,
    pub down: usize,
    /// Devices marked down without a probe because the channel was unavailable.
    pub channel_unavailable: usize,
    pub unaddressable: usize,
    /// The ledger was read during this tick.
    pub resynced: bool,
    /// The ledger read failed; due devices were left untouched.
    pub ledger_failed: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.due == 0
    }
}

/// Background health checker for every device in the ledger.
pub struct HealthScheduler<C: RemoteChannel> {
    ledger: DeviceLedger,
    connection: Arc<ConnectionManager<C>>,
    table: HealthTable,
    policy: SchedulePolicy,
    probe: ProbeCommand,
    last_sync: Arc<Mutex<Option<Instant>>>,
}

impl<C: RemoteChannel> Clone for HealthScheduler<C> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            connection: Arc::clone(&self.connection),
            table: self.table.clone(),
            policy: self.policy,
            probe: self.probe.clone(),
            last_sync: Arc::clone(&self.last_sync),
        }
    }
}

impl<C: RemoteChannel> HealthScheduler<C> {
    pub fn new(
        ledger: DeviceLedger,
        connection: Arc<ConnectionManager<C>>,
        table: HealthTable,
        policy: SchedulePolicy,
        probe: ProbeCommand,
    ) -> Self {
        Self {
            ledger,
            connection,
            table,
            policy,
            probe,
            last_sync: Arc::new(Mutex::new(None)),
        }
    }

    pub fn table(&self) -> &HealthTable {
        &self.table
    }

    pub fn connection(&self) -> &Arc<ConnectionManager<C>> {
        &self.connection
    }

    /// Populate the health table from the ledger.
    ///
    /// A failed read is logged and retried by the next tick.
    pub async fn init(&self) {
        match read_devices(&self.ledger).await {
            Ok(records) => {
                self.sync(&records, Instant::now()).await;
            }
            Err(e) => warn!(error = %e, "ledger unavailable at scheduler start"),
        }
    }

    async fn sync(&self, records: &[DeviceRecord], now: Instant) -> (usize, usize) {
        let ids = records.iter().map(|r| r.device_id.as_str());
        let (added, pruned) = self.table.sync(ids, now).await;
        let first = self.last_sync.lock().replace(now).is_none();
        if first {
            info!(devices = added, "health table populated from ledger");
        } else if added > 0 || pruned > 0 {
            debug!(added, pruned, "health table resynchronised with ledger");
        }
        (added, pruned)
    }

    fn sync_is_stale(&self, now: Instant) -> bool {
        match *self.last_sync.lock() {
            Some(at) => now.saturating_duration_since(at) >= self.policy.up_interval,
            None => true,
        }
    }

    /// Run one scheduling pass.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let now = Instant::now();
        let mut due = self.table.due(now).await;

        if due.is_empty() && !self.sync_is_stale(now) {
            return report;
        }

        let records = match read_devices(&self.ledger).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, due = due.len(), "ledger read failed, checks deferred");
                report.due = due.len();
                report.ledger_failed = true;
                return report;
            }
        };
        report.resynced = true;
        let (added, pruned) = self.sync(&records, now).await;
        if added > 0 || pruned > 0 || due.is_empty() {
            due = self.table.due(now).await;
        }
        report.due = due.len();
        if due.is_empty() {
            return report;
        }

        let mut batch: Vec<(&str, &str)> = Vec::with_capacity(due.len());
        for id in &due {
            let Some(record) = records.iter().find(|r| &r.device_id == id) else {
                continue;
            };
            if is_probeable(&record.mgmt_ip) {
                batch.push((record.device_id.as_str(), record.mgmt_ip.as_str()));
            } else {
                debug!(device_id = %id, mgmt_ip = %record.mgmt_ip, "no usable address, not probing");
                self.table
                    .update(id, |s| s.mark_unaddressable(&self.policy, now))
                    .await;
                report.unaddressable += 1;
            }
        }
        if batch.is_empty() {
            return report;
        }

        self.probe_batch(&batch, &mut report).await;
        report
    }

    async fn probe_batch(&self, batch: &[(&str, &str)], report: &mut TickReport) {
        let mut guard = match self.connection.ensure().await {
            Ok(guard) => guard,
            Err(e) => {
                debug!(error = %e, devices = batch.len(), "channel unavailable, marking batch down");
                self.mark_unavailable(batch, report).await;
                return;
            }
        };

        for (index, (device_id, ip)) in batch.iter().enumerate() {
            if !guard.is_live() {
                self.mark_unavailable(&batch[index..], report).await;
                return;
            }

            let command = self.probe.render(ip);
            let outcome = guard.execute(&command, self.policy.probe_timeout).await;
            let now = Instant::now();
            let healthy = match outcome {
                Ok(0) => true,
                Ok(status) => {
                    debug!(%device_id, %ip, status, "probe failed");
                    false
                }
                Err(ChannelError::CommandTimeout(after)) => {
                    debug!(%device_id, %ip, ?after, "probe timed out");
                    false
                }
                Err(e) => {
                    warn!(%device_id, error = %e, "session lost during probe");
                    false
                }
            };

            if healthy {
                self.table
                    .update(device_id, |s| s.record_success(&self.policy, now))
                    .await;
                report.up += 1;
            } else {
                self.table
                    .update(device_id, |s| s.record_failure(&self.policy, now))
                    .await;
                report.down += 1;
            }
        }
    }

    async fn mark_unavailable(&self, devices: &[(&str, &str)], report: &mut TickReport) {
        let now = Instant::now();
        for (device_id, _) in devices {
            self.table
                .update(device_id, |s| s.record_channel_unavailable(&self.policy, now))
                .await;
            report.channel_unavailable += 1;
        }
    }

    /// Poll until `shutdown` changes (or its sender is dropped).
    ///
    /// The first tick populates the health table, so a ledger that is
    /// locked at startup never delays shutdown.
    ///
    /// On exit the tick in progress is aborted, the session is closed and
    /// the health table is cleared.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            channel = %self.connection.describe(),
            up_interval = ?self.policy.up_interval,
            down_interval = ?self.policy.down_interval,
            max_retries = self.policy.max_retries,
            "health scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let worker = self.clone();
            let mut tick = tokio::spawn(async move { worker.tick().await });

            let joined = tokio::select! {
                joined = &mut tick => joined,
                _ = shutdown.changed() => {
                    tick.abort();
                    let _ = tick.await;
                    break;
                }
            };

            let pause = match joined {
                Ok(report) if report.is_idle() || report.ledger_failed => {
                    Some(self.policy.idle_interval)
                }
                Ok(report) => {
                    debug!(
                        due = report.due,
                        up = report.up,
                        down = report.down,
                        unavailable = report.channel_unavailable,
                        unaddressable = report.unaddressable,
                        "tick complete"
                    );
                    None
                }
                Err(e) if e.is_panic() => {
                    error!(error = %e, "health tick panicked, resetting channel");
                    self.connection.close().await;
                    Some(self.connection.reconnect_backoff())
                }
                Err(e) => {
                    warn!(error = %e, "health tick cancelled");
                    None
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }

        self.connection.close().await;
        self.table.clear().await;
        info!("health scheduler stopped");
    }
}
