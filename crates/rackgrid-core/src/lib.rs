//! rackgrid-core: configuration shared by the rackgrid crates.

pub mod config;
pub mod duration;

pub use config::{
    ChannelConfig, ChannelMode, HealthConfig, IP_PLACEHOLDER, RackConfig, StoreConfig,
};
pub use duration::{parse_duration, parse_interval};
