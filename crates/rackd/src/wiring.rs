//! Builds the library components from a loaded [`RackConfig`].

use std::sync::Arc;

use anyhow::Context;
use rackgrid_core::{ChannelConfig, ChannelMode, HealthConfig, RackConfig};
use rackgrid_health::{
    ConnectionManager, HealthScheduler, HealthTable, ProbeCommand, RemoteChannel, SchedulePolicy,
    ShellChannel, SshTarget,
};
use rackgrid_state::DeviceLedger;
use tracing::debug;

/// Open the shared device table, creating its directory if needed.
pub fn open_ledger(config: &RackConfig) -> anyhow::Result<DeviceLedger> {
    let path = &config.store.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let ledger = DeviceLedger::open(path, config.store.lock_timeout()?)
        .with_context(|| format!("opening device table {}", path.display()))?;
    Ok(ledger)
}

pub fn schedule_policy(health: &HealthConfig) -> anyhow::Result<SchedulePolicy> {
    Ok(SchedulePolicy {
        up_interval: health.up_interval()?,
        down_interval: health.down_interval()?,
        max_retries: health.max_retries,
        idle_interval: health.idle_interval()?,
        probe_timeout: health.probe_timeout()?,
    })
}

pub fn shell_channel(channel: &ChannelConfig) -> ShellChannel {
    match channel.mode {
        ChannelMode::Local => ShellChannel::local(),
        ChannelMode::Ssh => ShellChannel::ssh(SshTarget {
            host: channel.host.clone(),
            port: channel.port,
            user: channel.user.clone(),
            identity_file: channel.identity_file.clone(),
            ssh_binary: channel.ssh_binary.clone(),
        }),
    }
}

/// Scheduler over the configured shell channel, with a fresh health table.
pub fn scheduler(
    config: &RackConfig,
    ledger: DeviceLedger,
) -> anyhow::Result<HealthScheduler<ShellChannel>> {
    let channel = shell_channel(&config.channel);
    debug!(channel = %channel.describe(), "probe channel configured");
    let connection = Arc::new(ConnectionManager::new(
        channel,
        config.channel.connect_timeout()?,
        config.channel.reconnect_backoff()?,
    ));
    Ok(HealthScheduler::new(
        ledger,
        connection,
        HealthTable::new(),
        schedule_policy(&config.health)?,
        ProbeCommand::new(config.channel.probe_command.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn policy_follows_health_section() {
        let config = RackConfig::from_toml_str(
            "[health]\nup_interval = \"1m\"\ndown_interval = \"750ms\"\nmax_retries = 4\n",
        )
        .unwrap();
        let policy = schedule_policy(&config.health).unwrap();
        assert_eq!(policy.up_interval, Duration::from_secs(60));
        assert_eq!(policy.down_interval, Duration::from_millis(750));
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn channel_mode_selects_shell() {
        let mut config = RackConfig::default();
        config.channel.host = "jump.lab.local".to_string();
        config.channel.user = "ops".to_string();
        assert_eq!(
            shell_channel(&config.channel).describe(),
            "ssh://ops@jump.lab.local:22"
        );

        config.channel.mode = ChannelMode::Local;
        assert_eq!(shell_channel(&config.channel).describe(), "local shell");
    }

    #[test]
    fn open_ledger_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RackConfig::default();
        config.store.path = dir.path().join("state").join("devices.redb");
        let ledger = open_ledger(&config).unwrap();
        assert!(ledger.list().unwrap().is_empty());
        assert!(dir.path().join("state").is_dir());
    }
}
