//! rackd: the rackgrid daemon and operator CLI.
//!
//! `rackd serve` runs the health scheduler against the shared device
//! table until Ctrl-C. The other subcommands operate on the same table
//! from separate processes; the table lock keeps them consistent.
//!
//! # Usage
//!
//! ```text
//! rackd --config /etc/rackgrid/rackgrid.toml serve
//! rackd reserve sw-12 --user alice --hours 1 --minutes 30
//! rackd devices --format json
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod serve;
mod wiring;

#[derive(Parser)]
#[command(
    name = "rackd",
    about = "rackgrid: lab device reservations and health checks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to rackgrid.toml. Defaults apply when the file does not exist.
    #[arg(long, global = true, env = "RACKGRID_CONFIG", default_value = "rackgrid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the health scheduler until Ctrl-C.
    Serve {
        /// Seconds between health summary log lines.
        #[arg(long, default_value = "60")]
        summary_interval: u64,
    },
    /// Print every device with its reservation block.
    Devices {
        /// Probe every device once before printing.
        #[arg(long)]
        probe: bool,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Probe continuously and print the snapshot every second.
    Watch {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Reserve a free device.
    Reserve {
        device_id: String,
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value = "0")]
        hours: i64,
        #[arg(long, default_value = "0")]
        minutes: i64,
    },
    /// Release a device.
    Release { device_id: String },
    /// Show the ports derived from a device's address (or a literal address).
    Ports { target: String },
    /// Merge a JSON array of device records into the table.
    Import { file: PathBuf },
    /// Delete a device from the table.
    Remove { device_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| {
                    tracing_subscriber::EnvFilter::try_new("info,rackd=debug,rackgrid_health=debug")
                })?,
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = rackgrid_core::RackConfig::load_or_default(&cli.config)?;

    match cli.command {
        Command::Serve { summary_interval } => serve::run(config, summary_interval).await,
        Command::Devices { probe, format } => {
            commands::devices::list(&config, probe, &format).await
        }
        Command::Watch { format } => commands::devices::watch(&config, &format).await,
        Command::Reserve {
            device_id,
            user,
            hours,
            minutes,
        } => commands::reserve::reserve(&config, &device_id, &user, hours, minutes),
        Command::Release { device_id } => commands::reserve::release(&config, &device_id),
        Command::Ports { target } => commands::admin::ports(&config, &target),
        Command::Import { file } => commands::admin::import(&config, &file),
        Command::Remove { device_id } => commands::admin::remove(&config, &device_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reserve_with_split_duration() {
        let cli = Cli::try_parse_from([
            "rackd", "reserve", "sw-12", "--user", "alice", "--hours", "1", "--minutes", "30",
        ])
        .unwrap();
        match cli.command {
            Command::Reserve {
                device_id,
                user,
                hours,
                minutes,
            } => {
                assert_eq!(device_id, "sw-12");
                assert_eq!(user, "alice");
                assert_eq!((hours, minutes), (1, 30));
            }
            _ => panic!("expected reserve"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["rackd", "devices", "--config", "/etc/rackgrid/lab.toml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/rackgrid/lab.toml"));
        assert!(matches!(cli.command, Command::Devices { probe: false, .. }));
    }

    #[test]
    fn reserve_requires_user() {
        assert!(Cli::try_parse_from(["rackd", "reserve", "sw-1", "--minutes", "5"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
