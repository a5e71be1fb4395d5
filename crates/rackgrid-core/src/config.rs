//! rackgrid.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::duration::{parse_duration, parse_interval};

/// Placeholder substituted with the device address in `probe_command`.
pub const IP_PLACEHOLDER: &str = "{ip}";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RackConfig {
    pub store: StoreConfig,
    pub channel: ChannelConfig,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// redb database holding the device table.
    pub path: PathBuf,
    /// Maximum wait for the cross-process table lock.
    pub lock_timeout: String,
}

/// Where probe commands run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// A shell on `host`, reached over ssh.
    #[default]
    Ssh,
    /// A shell on the machine running the daemon.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub mode: ChannelMode,
    /// Host that runs the probe commands (usually a jump box on the lab network).
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub ssh_binary: String,
    pub connect_timeout: String,
    pub reconnect_backoff: String,
    /// Shell command run once per device, `{ip}` is replaced by its address.
    pub probe_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub up_interval: String,
    pub down_interval: String,
    pub max_retries: u32,
    pub idle_interval: String,
    pub probe_timeout: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rackgrid.redb"),
            lock_timeout: "5s".to_string(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            mode: ChannelMode::Ssh,
            host: "localhost".to_string(),
            port: 22,
            user: "lab".to_string(),
            identity_file: None,
            ssh_binary: "ssh".to_string(),
            connect_timeout: "10s".to_string(),
            reconnect_backoff: "5s".to_string(),
            probe_command: "ping -c 1 -W 1 {ip}".to_string(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            up_interval: "10s".to_string(),
            down_interval: "2s".to_string(),
            max_retries: 3,
            idle_interval: "500ms".to_string(),
            probe_timeout: "3s".to_string(),
        }
    }
}

impl RackConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: RackConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every duration parses, with non-zero cadences and timeouts,
    /// and that the probe command is usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.store.lock_timeout()?;
        self.channel.connect_timeout()?;
        self.channel.reconnect_backoff()?;
        self.health.up_interval()?;
        self.health.down_interval()?;
        self.health.idle_interval()?;
        self.health.probe_timeout()?;
        if !self.channel.probe_command.contains(IP_PLACEHOLDER) {
            bail!("channel.probe_command must contain the {IP_PLACEHOLDER} placeholder");
        }
        if self.health.max_retries == 0 {
            bail!("health.max_retries must be at least 1");
        }
        Ok(())
    }
}

fn duration_field(field: &str, value: &str) -> anyhow::Result<Duration> {
    parse_duration(value).with_context(|| format!("invalid duration for {field}: {value:?}"))
}

fn interval_field(field: &str, value: &str) -> anyhow::Result<Duration> {
    parse_interval(value)
        .with_context(|| format!("invalid duration for {field}: {value:?} (must be non-zero)"))
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> anyhow::Result<Duration> {
        duration_field("store.lock_timeout", &self.lock_timeout)
    }
}

impl ChannelConfig {
    pub fn connect_timeout(&self) -> anyhow::Result<Duration> {
        interval_field("channel.connect_timeout", &self.connect_timeout)
    }

    pub fn reconnect_backoff(&self) -> anyhow::Result<Duration> {
        duration_field("channel.reconnect_backoff", &self.reconnect_backoff)
    }
}

impl HealthConfig {
    pub fn up_interval(&self) -> anyhow::Result<Duration> {
        interval_field("health.up_interval", &self.up_interval)
    }

    pub fn down_interval(&self) -> anyhow::Result<Duration> {
        interval_field("health.down_interval", &self.down_interval)
    }

    pub fn idle_interval(&self) -> anyhow::Result<Duration> {
        interval_field("health.idle_interval", &self.idle_interval)
    }

    pub fn probe_timeout(&self) -> anyhow::Result<Duration> {
        interval_field("health.probe_timeout", &self.probe_timeout)
    }
}
