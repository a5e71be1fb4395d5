use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, bail};
use rackgrid_api::derive_ports;
use rackgrid_core::RackConfig;
use rackgrid_state::DeviceRecord;

use crate::wiring;

/// `target` is either a literal address or a device id.
pub fn ports(config: &RackConfig, target: &str) -> anyhow::Result<()> {
    let mgmt_ip = if target.parse::<IpAddr>().is_ok() {
        target.to_string()
    } else {
        match wiring::open_ledger(config)?.find(target)? {
            Some(record) => record.mgmt_ip,
            None => bail!("device {target} not found"),
        }
    };
    let ports = derive_ports(&mgmt_ip)?;
    println!("{}", serde_json::to_string_pretty(&ports)?);
    Ok(())
}

pub fn import(config: &RackConfig, file: &Path) -> anyhow::Result<()> {
    let records = read_records(file)?;
    let count = wiring::open_ledger(config)?.import(records)?;
    println!("✓ Imported {count} devices from {}", file.display());
    Ok(())
}

pub fn remove(config: &RackConfig, device_id: &str) -> anyhow::Result<()> {
    if !wiring::open_ledger(config)?.remove(device_id)? {
        bail!("device {device_id} not found");
    }
    println!("✓ Removed {device_id}");
    Ok(())
}

fn read_records(file: &Path) -> anyhow::Result<Vec<DeviceRecord>> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of device records", file.display()))
}
