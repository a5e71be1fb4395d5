//! Reserve / release state transitions on the device ledger.
//!
//! Every transition is a single [`DeviceLedger::modify`] call, so the
//! free-check and the write happen under one hold of the table lock.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rackgrid_health::HealthTable;
use rackgrid_state::{DeviceLedger, Tag};
use serde::Deserialize;
use tracing::info;

use crate::error::{DeskError, DeskResult};

/// Reservation length as entered in the reservation form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ReservationRequest {
    #[serde(default)]
    pub hours: i64,
    #[serde(default)]
    pub minutes: i64,
}

impl ReservationRequest {
    pub fn total_minutes(&self) -> DeskResult<i64> {
        if self.hours < 0 || self.minutes < 0 {
            return Err(DeskError::Validation(
                "hours and minutes must not be negative".to_string(),
            ));
        }
        self.hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(self.minutes))
            .ok_or_else(|| DeskError::Validation("duration too long".to_string()))
    }
}

/// Start and end of a granted reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationWindow {
    pub device_id: String,
    pub user: String,
    pub duration_minutes: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReservationManager {
    ledger: DeviceLedger,
    health: HealthTable,
}

impl ReservationManager {
    pub fn new(ledger: DeviceLedger, health: HealthTable) -> Self {
        Self { ledger, health }
    }

    pub fn ledger(&self) -> &DeviceLedger {
        &self.ledger
    }

    /// Reserve a free device for `duration_minutes`, starting now.
    pub fn reserve(
        &self,
        device_id: &str,
        user: &str,
        duration_minutes: i64,
    ) -> DeskResult<ReservationWindow> {
        self.reserve_at(device_id, user, duration_minutes, Utc::now())
    }

    /// Like [`reserve`](Self::reserve) with the duration split into hours and minutes.
    pub fn reserve_for(
        &self,
        device_id: &str,
        user: &str,
        request: ReservationRequest,
    ) -> DeskResult<ReservationWindow> {
        self.reserve(device_id, user, request.total_minutes()?)
    }

    /// Reserve with an explicit start time.
    pub fn reserve_at(
        &self,
        device_id: &str,
        user: &str,
        duration_minutes: i64,
        now: DateTime<Utc>,
    ) -> DeskResult<ReservationWindow> {
        let user = user.trim();
        if user.is_empty() {
            return Err(DeskError::Validation("user must not be empty".to_string()));
        }
        if duration_minutes <= 0 {
            return Err(DeskError::Validation(format!(
                "duration must be positive, got {duration_minutes} minutes"
            )));
        }
        let end = ChronoDuration::try_minutes(duration_minutes)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| DeskError::Validation("duration too long".to_string()))?;

        self.ledger.modify(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.device_id == device_id)
                .ok_or_else(|| DeskError::NotFound(device_id.to_string()))?;
            if record.tag == Tag::Resv {
                return Err(DeskError::Conflict(format!(
                    "{device_id} is already reserved by {}",
                    record.current_user
                )));
            }
            record.mark_reserved(user, duration_minutes, end);
            Ok(())
        })?;

        info!(%device_id, %user, duration_minutes, %end, "device reserved");
        Ok(ReservationWindow {
            device_id: device_id.to_string(),
            user: user.to_string(),
            duration_minutes,
            start: now,
            end,
        })
    }

    /// Free a device. Releasing a free device succeeds without changes.
    pub fn release(&self, device_id: &str) -> DeskResult<()> {
        let previous = self.ledger.modify(|records| {
            let record = records
                .iter_mut()
                .find(|r| r.device_id == device_id)
                .ok_or_else(|| DeskError::NotFound(device_id.to_string()))?;
            let previous = record.tag;
            record.mark_free();
            Ok::<_, DeskError>(previous)
        })?;
        if previous != Tag::Free {
            info!(%device_id, from = %previous, "device released");
        }
        Ok(())
    }

    /// Schedule an immediate health check for `device_id`.
    pub async fn refresh_health_now(&self, device_id: &str) {
        self.health
            .refresh_now(device_id, tokio::time::Instant::now())
            .await;
    }
}
