//! Health snapshot: ledger rows joined with live health state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rackgrid_health::{Health, HealthTable, read_devices};
use rackgrid_state::{DeviceLedger, DeviceRecord, Tag};
use serde::Serialize;

use crate::error::DeskResult;

const NA: &str = "NA";
const DISPLAY_TIME: &str = "%d-%m-%Y %H:%M";

/// One device as presented to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    pub record: DeviceRecord,
    pub health: Health,
    pub retry_count: u32,
    pub resv_block: String,
}

/// Snapshot of every device at the current time.
pub async fn snapshot(ledger: &DeviceLedger, health: &HealthTable) -> DeskResult<Vec<DeviceView>> {
    snapshot_at(ledger, health, Utc::now()).await
}

/// Snapshot with an explicit wall-clock time for the display blocks.
pub async fn snapshot_at(
    ledger: &DeviceLedger,
    health: &HealthTable,
    now: DateTime<Utc>,
) -> DeskResult<Vec<DeviceView>> {
    let records = read_devices(ledger).await?;
    let states = health.all().await;
    Ok(records
        .into_iter()
        .map(|record| {
            let (health, retry_count) = states
                .get(&record.device_id)
                .map(|s| (s.health, s.retry_count))
                .unwrap_or_default();
            let resv_block = resv_block(&record, now);
            DeviceView {
                record,
                health,
                retry_count,
                resv_block,
            }
        })
        .collect())
}

/// Reservation display text for one row.
///
/// ```text
/// User: alice, Duration: 1hrs,30mins, Time Left: 00:42:10
/// Start: 01-03-2025 09:00 End: 01-03-2025 10:30
/// ```
pub fn resv_block(record: &DeviceRecord, now: DateTime<Utc>) -> String {
    match record.tag {
        Tag::Free => String::new(),
        Tag::Static => {
            let owner = match record.current_user.as_str() {
                "" => "-",
                user => user,
            };
            format!("Owner: {owner}")
        }
        Tag::Resv => {
            let user = match record.current_user.as_str() {
                "" => NA,
                user => user,
            };
            let minutes = record.duration_minutes().filter(|m| *m >= 0);
            let end = record.resv_end();
            let start = minutes
                .and_then(ChronoDuration::try_minutes)
                .zip(end)
                .and_then(|(length, end)| end.checked_sub_signed(length));

            let duration = minutes
                .map(|m| format!("{}hrs,{}mins", m / 60, m % 60))
                .unwrap_or_else(|| NA.to_string());
            let time_left = end
                .map(|end| format_hms((end - now).num_seconds()))
                .unwrap_or_else(|| NA.to_string());

            format!(
                "User: {user}, Duration: {duration}, Time Left: {time_left}\nStart: {} End: {}",
                display_time(start),
                display_time(end),
            )
        }
    }
}

fn display_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|ts| ts.format(DISPLAY_TIME).to_string())
        .unwrap_or_else(|| NA.to_string())
}

/// `HH:MM:SS`, floored at zero. Hours are not wrapped at 24.
fn format_hms(seconds: i64) -> String {
    let s = seconds.max(0);
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}
