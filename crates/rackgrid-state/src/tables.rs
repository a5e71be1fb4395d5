//! redb table definitions for the device ledger.
//!
//! Keys are `device_id`; values are JSON-serialized [`DeviceRecord`](crate::DeviceRecord)s.

use redb::TableDefinition;

/// Device rows keyed by `{device_id}`.
pub const DEVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
