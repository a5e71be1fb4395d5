use rackgrid_api::{ReservationManager, ReservationRequest};
use rackgrid_core::RackConfig;
use rackgrid_health::HealthTable;
use rackgrid_state::format_timestamp;

use crate::wiring;

fn desk(config: &RackConfig) -> anyhow::Result<ReservationManager> {
    Ok(ReservationManager::new(
        wiring::open_ledger(config)?,
        HealthTable::new(),
    ))
}

pub fn reserve(
    config: &RackConfig,
    device_id: &str,
    user: &str,
    hours: i64,
    minutes: i64,
) -> anyhow::Result<()> {
    let window = desk(config)?.reserve_for(device_id, user, ReservationRequest { hours, minutes })?;
    println!(
        "✓ Reserved {} for {} ({} min)",
        window.device_id, window.user, window.duration_minutes
    );
    println!("  Start: {}", format_timestamp(window.start));
    println!("  End:   {}", format_timestamp(window.end));
    Ok(())
}

pub fn release(config: &RackConfig, device_id: &str) -> anyhow::Result<()> {
    desk(config)?.release(device_id)?;
    println!("✓ Released {device_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rackgrid_state::{DeviceRecord, Tag};

    use super::*;

    #[test]
    fn reserve_then_release_through_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RackConfig::default();
        config.store.path = dir.path().join("devices.redb");
        wiring::open_ledger(&config)
            .unwrap()
            .upsert(DeviceRecord::new("sw-1", "10.0.0.1"))
            .unwrap();

        reserve(&config, "sw-1", "alice", 0, 45).unwrap();
        let row = wiring::open_ledger(&config).unwrap().find("sw-1").unwrap().unwrap();
        assert_eq!(row.tag, Tag::Resv);
        assert_eq!(row.duration, "45");

        let err = reserve(&config, "sw-1", "bob", 1, 0).unwrap_err();
        assert!(err.to_string().contains("already reserved"));

        release(&config, "sw-1").unwrap();
        assert!(release(&config, "sw-9").is_err());
    }
}
