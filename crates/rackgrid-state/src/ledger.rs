//! DeviceLedger: typed, validated access to the persisted device table.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::lock::TableLock;
use crate::store::{PersistedTable, RedbTable};
use crate::types::DeviceRecord;

/// Shared handle to the device table and its lock.
///
/// Cheap to clone; all clones serialize through the same [`TableLock`].
#[derive(Clone)]
pub struct DeviceLedger {
    table: Arc<dyn PersistedTable>,
    lock: Arc<TableLock>,
}

impl DeviceLedger {
    pub fn new(table: Arc<dyn PersistedTable>, lock: TableLock) -> Self {
        Self {
            table,
            lock: Arc::new(lock),
        }
    }

    /// Open the redb table at `path`, locked through `<path>.lock`.
    pub fn open(path: &Path, lock_timeout: Duration) -> StateResult<Self> {
        let lock = TableLock::for_table(path, lock_timeout);
        let table = {
            let _guard = lock.acquire()?;
            RedbTable::open(path)?
        };
        info!(?path, "device ledger opened");
        Ok(Self::new(Arc::new(table), lock))
    }

    /// In-memory ledger with a process-local lock (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let table = RedbTable::open_in_memory()?;
        Ok(Self::new(
            Arc::new(table),
            TableLock::local(Duration::from_secs(5)),
        ))
    }

    /// All device records, normalized.
    pub fn list(&self) -> StateResult<Vec<DeviceRecord>> {
        let _guard = self.lock.acquire()?;
        self.read_unlocked()
    }

    /// Look up one device.
    pub fn find(&self, device_id: &str) -> StateResult<Option<DeviceRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|record| record.device_id == device_id))
    }

    /// Replace the whole table with `records` in one collaborator write.
    pub fn replace_all(&self, mut records: Vec<DeviceRecord>) -> StateResult<()> {
        let _guard = self.lock.acquire()?;
        self.write_unlocked(&mut records, &[])
    }

    /// Read-modify-write under one continuous hold of the table lock.
    ///
    /// `f` sees the current rows and may mutate them. When it returns
    /// `Ok`, the mutated rows are written back before the lock is
    /// released; when it returns `Err`, nothing is written. Only rows
    /// that `f` added or changed are validated, so one malformed row on
    /// disk does not block mutations of the others.
    pub fn modify<T, E>(
        &self,
        f: impl FnOnce(&mut Vec<DeviceRecord>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StateError>,
    {
        let _guard = self.lock.acquire()?;
        let mut records = self.read_unlocked()?;
        let before = records.clone();
        let out = f(&mut records)?;
        self.write_unlocked(&mut records, &before)?;
        Ok(out)
    }

    /// Insert a device or replace the row with the same `device_id`.
    ///
    /// Returns `true` when an existing row was replaced.
    pub fn upsert(&self, record: DeviceRecord) -> StateResult<bool> {
        self.modify(|records| {
            let replaced = match records
                .iter_mut()
                .find(|existing| existing.device_id == record.device_id)
            {
                Some(existing) => {
                    *existing = record;
                    true
                }
                None => {
                    records.push(record);
                    false
                }
            };
            Ok(replaced)
        })
    }

    /// Remove a device. Returns `true` if it existed.
    pub fn remove(&self, device_id: &str) -> StateResult<bool> {
        self.modify(|records| {
            let before = records.len();
            records.retain(|record| record.device_id != device_id);
            Ok(records.len() != before)
        })
    }

    /// Merge `records` into the table (upsert by `device_id`). Returns the number of rows written.
    pub fn import(&self, incoming: Vec<DeviceRecord>) -> StateResult<usize> {
        let count = incoming.len();
        self.modify(|records| {
            for record in incoming {
                match records
                    .iter_mut()
                    .find(|existing| existing.device_id == record.device_id)
                {
                    Some(existing) => *existing = record,
                    None => records.push(record),
                }
            }
            Ok::<_, StateError>(())
        })?;
        info!(count, "devices imported");
        Ok(count)
    }

    fn read_unlocked(&self) -> StateResult<Vec<DeviceRecord>> {
        let mut records = self.table.read()?;
        for record in &mut records {
            record.normalize();
        }
        Ok(records)
    }

    /// Validate and persist. Rows equal to their entry in `unchanged` skip validation.
    fn write_unlocked(
        &self,
        records: &mut [DeviceRecord],
        unchanged: &[DeviceRecord],
    ) -> StateResult<()> {
        let unchanged: HashMap<&str, &DeviceRecord> = unchanged
            .iter()
            .map(|record| (record.device_id.as_str(), record))
            .collect();
        let mut seen = HashSet::with_capacity(records.len());
        for record in records.iter_mut() {
            record.normalize();
            if unchanged.get(record.device_id.as_str()) != Some(&&*record) {
                record.validate().map_err(StateError::Invalid)?;
            }
            if !seen.insert(record.device_id.clone()) {
                return Err(StateError::Invalid(format!(
                    "duplicate device_id {}",
                    record.device_id
                )));
            }
        }
        self.table.write(records)?;
        debug!(rows = records.len(), "ledger persisted");
        Ok(())
    }
}
