//! Persisted device table.
//!
//! [`PersistedTable`] is the read-all / write-all contract the ledger
//! consumes. [`RedbTable`] implements it over redb: every row is a
//! JSON-serialized [`DeviceRecord`] keyed by `device_id`, and a write
//! replaces the whole table inside one write transaction, so readers see
//! either the old table or the new one.
//!
//! redb holds an exclusive handle on its file while a `Database` is open.
//! The file-backed variant therefore opens the database per call; callers
//! serialize calls through the ledger's [`TableLock`](crate::TableLock),
//! which lets several processes share one table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::DEVICES;
use crate::types::DeviceRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Durable storage for the device table.
pub trait PersistedTable: Send + Sync {
    /// Read every row, in key order.
    fn read(&self) -> StateResult<Vec<DeviceRecord>>;

    /// Replace the table with `records` in a single atomic step.
    fn write(&self, records: &[DeviceRecord]) -> StateResult<()>;
}

enum Backing {
    File(PathBuf),
    Memory(Arc<Database>),
}

/// redb-backed device table.
pub struct RedbTable {
    backing: Backing,
}

impl RedbTable {
    /// Use (or create) the database at `path`, creating the table if absent.
    pub fn open(path: &Path) -> StateResult<Self> {
        let table = Self {
            backing: Backing::File(path.to_path_buf()),
        };
        table.with_db(ensure_tables)?;
        debug!(?path, "device table opened");
        Ok(table)
    }

    /// Create an ephemeral in-memory table (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        ensure_tables(&db)?;
        debug!("in-memory device table opened");
        Ok(Self {
            backing: Backing::Memory(Arc::new(db)),
        })
    }

    /// Path of the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File(path) => Some(path),
            Backing::Memory(_) => None,
        }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> StateResult<T>) -> StateResult<T> {
        match &self.backing {
            Backing::File(path) => {
                let db = Database::create(path).map_err(map_err!(Open))?;
                f(&db)
            }
            Backing::Memory(db) => f(db),
        }
    }
}

fn ensure_tables(db: &Database) -> StateResult<()> {
    let txn = db.begin_write().map_err(map_err!(Transaction))?;
    // Opening a table in a write transaction creates it if absent.
    txn.open_table(DEVICES).map_err(map_err!(Table))?;
    txn.commit().map_err(map_err!(Transaction))?;
    Ok(())
}

impl PersistedTable for RedbTable {
    fn read(&self) -> StateResult<Vec<DeviceRecord>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
            let mut results = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let record: DeviceRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
            Ok(results)
        })
    }

    fn write(&self, records: &[DeviceRecord]) -> StateResult<()> {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
            rows.push((record.device_id.as_str(), value));
        }
        let keep: HashSet<&str> = rows.iter().map(|(key, _)| *key).collect();

        self.with_db(|db| {
            let txn = db.begin_write().map_err(map_err!(Transaction))?;
            {
                let mut table = txn.open_table(DEVICES).map_err(map_err!(Table))?;
                let mut stale = Vec::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (key, _) = entry.map_err(map_err!(Read))?;
                    if !keep.contains(key.value()) {
                        stale.push(key.value().to_string());
                    }
                }
                for key in &stale {
                    table.remove(key.as_str()).map_err(map_err!(Write))?;
                }
                for (key, value) in &rows {
                    table
                        .insert(*key, value.as_slice())
                        .map_err(map_err!(Write))?;
                }
            }
            txn.commit().map_err(map_err!(Transaction))?;
            debug!(rows = rows.len(), "device table written");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tag;

    fn device(id: &str, ip: &str) -> DeviceRecord {
        DeviceRecord {
            model_name: "N9K-C93180YC".to_string(),
            hw_id: format!("HW-{id}"),
            port_id: "Gi1/0/1".to_string(),
            ..DeviceRecord::new(id, ip)
        }
    }

    #[test]
    fn empty_table_reads_empty() {
        let table = RedbTable::open_in_memory().unwrap();
        assert!(table.read().unwrap().is_empty());
    }

    #[test]
    fn write_then_read_in_key_order() {
        let table = RedbTable::open_in_memory().unwrap();
        table
            .write(&[device("sw-b", "10.0.0.2"), device("sw-a", "10.0.0.1")])
            .unwrap();

        let rows = table.read().unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.device_id.as_str()).collect();
        assert_eq!(ids, ["sw-a", "sw-b"]);
        assert_eq!(rows[0].hw_id, "HW-sw-a");
    }

    #[test]
    fn write_replaces_whole_table() {
        let table = RedbTable::open_in_memory().unwrap();
        table
            .write(&[device("sw-1", "10.0.0.1"), device("sw-2", "10.0.0.2")])
            .unwrap();

        let mut changed = device("sw-2", "10.0.0.22");
        changed.tag = Tag::Static;
        table.write(&[changed.clone()]).unwrap();

        assert_eq!(table.read().unwrap(), vec![changed]);
    }

    #[test]
    fn write_drops_every_stale_row() {
        let dir = tempfile::tempdir().unwrap();
        let table = RedbTable::open(&dir.path().join("devices.redb")).unwrap();
        let rack: Vec<_> = (0..200)
            .map(|i| device(&format!("sw-{i:03}"), &format!("10.0.{}.{}", i / 250, i % 250)))
            .collect();
        table.write(&rack).unwrap();

        let kept = [device("sw-007", "10.0.0.7"), device("sw-new", "10.9.9.9")];
        table.write(&kept).unwrap();

        let ids: Vec<_> = table
            .read()
            .unwrap()
            .into_iter()
            .map(|r| r.device_id)
            .collect();
        assert_eq!(ids, ["sw-007", "sw-new"]);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("devices.redb");

        {
            let table = RedbTable::open(&db_path).unwrap();
            table.write(&[device("sw-1", "10.0.0.1")]).unwrap();
        }

        let table = RedbTable::open(&db_path).unwrap();
        let rows = table.read().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device_id, "sw-1");
        assert_eq!(table.path(), Some(db_path.as_path()));
    }

    #[test]
    fn two_handles_on_one_file_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("devices.redb");
        let writer = RedbTable::open(&db_path).unwrap();
        let reader = RedbTable::open(&db_path).unwrap();

        writer.write(&[device("sw-7", "10.0.0.7")]).unwrap();
        assert_eq!(reader.read().unwrap().len(), 1);
    }
}
