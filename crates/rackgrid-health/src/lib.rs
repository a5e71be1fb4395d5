//! rackgrid-health: device health scheduling for rackgrid.
//!
//! Probes every device in the ledger through one shared remote shell and
//! keeps an in-memory health table that the snapshot API reads.
//!
//! # Architecture
//!
//! ```text
//! HealthScheduler (background loop, one task per tick)
//!   ├── HealthTable (device_id → HealthState, never persisted)
//!   ├── DeviceLedger (read once per tick for addresses and membership)
//!   └── ConnectionManager
//!         └── RemoteChannel → RemoteSession (ShellChannel over ssh or local sh)
//! ```
//!
//! # Cadence
//!
//! A successful probe schedules the next check after `up_interval`. A
//! failed probe retries after `down_interval` until `max_retries`
//! consecutive failures, then falls back to `up_interval`. When the
//! channel is unavailable no probe is sent and every due device is marked
//! `down` and retried after `down_interval`.

pub mod channel;
pub mod checker;
pub mod connection;
pub mod error;
pub mod scheduler;
pub mod shell;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use channel::{RemoteChannel, RemoteSession};
pub use checker::{Health, HealthState, SchedulePolicy, is_probeable};
pub use connection::{ConnectionManager, SessionGuard};
pub use error::{ChannelError, ChannelResult};
pub use scheduler::{HealthScheduler, ProbeCommand, TickReport, read_devices};
pub use shell::{ShellChannel, ShellSession, ShellTarget, SshTarget};
pub use table::{HealthSummary, HealthTable};
