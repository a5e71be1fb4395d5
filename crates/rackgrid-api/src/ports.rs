//! Port numbers derived from a device's management address.

use serde::Serialize;

use crate::error::{DeskError, DeskResult};

const AV_BASE: u32 = 60000;
const OLD_MAIN_BASE: u32 = 50000;
const NEW_MAIN_BASE: u32 = 51000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DerivedPorts {
    pub switch_id: u32,
    pub av_port: u32,
    pub old_main_port: u32,
    pub new_main_port: u32,
}

/// Derive ports from the last dot-separated octet of `mgmt_ip`.
pub fn derive_ports(mgmt_ip: &str) -> DeskResult<DerivedPorts> {
    let octet = mgmt_ip
        .trim()
        .rsplit('.')
        .next()
        .and_then(|last| last.parse::<u8>().ok())
        .ok_or_else(|| {
            DeskError::Validation(format!("no trailing octet in address {mgmt_ip:?}"))
        })?;
    let n = u32::from(octet);
    Ok(DerivedPorts {
        switch_id: n,
        av_port: AV_BASE + n,
        old_main_port: OLD_MAIN_BASE + n,
        new_main_port: NEW_MAIN_BASE + n,
    })
}
