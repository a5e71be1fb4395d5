//! HealthTable: the in-memory per-device health container.
//!
//! Owned by the scheduler and shared (by cloning) with the snapshot and
//! reservation code. Every single-device update happens under one write
//! lock. Nothing here is persisted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::checker::{Health, HealthState};

/// Counts of devices per health value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub up: usize,
    pub down: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HealthTable {
    states: Arc<RwLock<HashMap<String, HealthState>>>,
}

impl HealthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, device_id: &str) -> Option<HealthState> {
        self.states.read().await.get(device_id).copied()
    }

    /// Copy of every entry.
    pub async fn all(&self) -> HashMap<String, HealthState> {
        self.states.read().await.clone()
    }

    /// Align the table with the ledger's device ids.
    ///
    /// Unseen ids are registered as `unknown` and due at `now`; ids that
    /// are no longer present are dropped. Returns `(added, pruned)`.
    pub async fn sync<'a>(
        &self,
        device_ids: impl IntoIterator<Item = &'a str>,
        now: Instant,
    ) -> (usize, usize) {
        let live: HashSet<&str> = device_ids.into_iter().collect();
        let mut states = self.states.write().await;

        let before = states.len();
        states.retain(|id, _| live.contains(id.as_str()));
        let pruned = before - states.len();

        let mut added = 0;
        for id in live {
            if !states.contains_key(id) {
                states.insert(id.to_string(), HealthState::new(now));
                added += 1;
            }
        }
        (added, pruned)
    }

    /// Ids whose next check is due at `now`, sorted.
    pub async fn due(&self, now: Instant) -> Vec<String> {
        let mut due: Vec<String> = self
            .states
            .read()
            .await
            .iter()
            .filter(|(_, state)| state.is_due(now))
            .map(|(id, _)| id.clone())
            .collect();
        due.sort();
        due
    }

    /// Apply `f` to one existing entry. Returns `false` if the id is unknown.
    pub async fn update(&self, device_id: &str, f: impl FnOnce(&mut HealthState)) -> bool {
        match self.states.write().await.get_mut(device_id) {
            Some(state) => {
                f(state);
                true
            }
            None => false,
        }
    }

    /// Make a device due immediately with `retry_count=0`, creating it if missing.
    pub async fn refresh_now(&self, device_id: &str, now: Instant) {
        self.states
            .write()
            .await
            .entry(device_id.to_string())
            .or_insert_with(|| HealthState::new(now))
            .refresh(now);
    }

    pub async fn summary(&self) -> HealthSummary {
        let states = self.states.read().await;
        let mut summary = HealthSummary::default();
        for state in states.values() {
            match state.health {
                Health::Up => summary.up += 1,
                Health::Down => summary.down += 1,
                Health::Unknown => summary.unknown += 1,
            }
        }
        summary
    }

    pub async fn clear(&self) {
        self.states.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::checker::SchedulePolicy;

    #[tokio::test(start_paused = true)]
    async fn sync_registers_and_prunes() {
        let table = HealthTable::new();
        let now = Instant::now();

        assert_eq!(table.sync(["sw-1", "sw-2"], now).await, (2, 0));
        assert_eq!(table.due(now).await, ["sw-1", "sw-2"]);

        table
            .update("sw-1", |s| s.record_success(&SchedulePolicy::default(), now))
            .await;
        assert_eq!(table.sync(["sw-1", "sw-3"], now).await, (1, 1));

        // Existing entries keep their state.
        assert_eq!(table.get("sw-1").await.unwrap().health, Health::Up);
        assert!(table.get("sw-2").await.is_none());
        assert_eq!(table.due(now).await, ["sw-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn update_ignores_unknown_ids() {
        let table = HealthTable::new();
        assert!(!table.update("ghost", |s| s.retry_count = 9).await);
        assert!(table.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_resets_and_creates() {
        let table = HealthTable::new();
        let now = Instant::now();
        table.sync(["sw-1"], now).await;
        table
            .update("sw-1", |s| {
                s.record_failure(&SchedulePolicy::default(), now);
                s.record_failure(&SchedulePolicy::default(), now);
            })
            .await;

        let later = now + Duration::from_secs(1);
        table.refresh_now("sw-1", later).await;
        let state = table.get("sw-1").await.unwrap();
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.health, Health::Down);
        assert_eq!(state.next_check_due_at, later);

        table.refresh_now("sw-new", later).await;
        assert_eq!(table.get("sw-new").await.unwrap().health, Health::Unknown);
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_counts_each_health() {
        let table = HealthTable::new();
        let now = Instant::now();
        let policy = SchedulePolicy::default();
        table.sync(["a", "b", "c"], now).await;
        table.update("a", |s| s.record_success(&policy, now)).await;
        table.update("b", |s| s.record_failure(&policy, now)).await;

        assert_eq!(
            table.summary().await,
            HealthSummary {
                up: 1,
                down: 1,
                unknown: 1
            }
        );
        table.clear().await;
        assert_eq!(table.len().await, 0);
    }
}
