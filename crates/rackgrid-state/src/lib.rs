//! rackgrid-state: the device ledger.
//!
//! The ledger is the authoritative table of lab devices and their
//! reservation fields. It sits on top of a [`PersistedTable`] (read-all /
//! write-all) and a [`TableLock`] that is effective across processes.
//!
//! # Architecture
//!
//! ```text
//! DeviceLedger
//!   ├── TableLock (flock on `<db>.lock`, bounded wait)
//!   └── PersistedTable
//!         └── RedbTable (JSON rows in the `devices` table)
//! ```
//!
//! Every mutation is a read-modify-write executed by
//! [`DeviceLedger::modify`], which holds the lock from the read through
//! the write so concurrent reservations cannot both observe `free`.

pub mod error;
pub mod ledger;
pub mod lock;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ledger::DeviceLedger;
pub use lock::{LockGuard, TableLock};
pub use store::{PersistedTable, RedbTable};
pub use types::*;
