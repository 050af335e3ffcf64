//! Daemon configuration.
//!
//! Every option can be given on the command line or through the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use netdevd_rtnl::DEFAULT_CAPACITY;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable lines.
    Pretty,
}

/// netdevd configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "netdevd", version, about = "Create virtual network devices from .netdev files")]
pub struct Config {
    /// Directory holding `*.netdev` and `*.network` files.
    #[arg(long, env = "NETDEVD_CONFIG_DIR", default_value = "/etc/netdevd")]
    pub config_dir: PathBuf,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, env = "NETDEVD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "NETDEVD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// How often links that devices wait on are checked, in milliseconds.
    #[arg(
        long,
        env = "NETDEVD_LINK_POLL_MS",
        default_value_t = 1000,
        value_parser = clap::value_parser!(u64).range(10..)
    )]
    pub link_poll_ms: u64,

    /// Exit once no request is in flight and print the device table as JSON.
    #[arg(long, env = "NETDEVD_ONCE")]
    pub once: bool,

    /// Acknowledge every request in-process instead of talking to the kernel.
    #[arg(long, env = "NETDEVD_DRY_RUN")]
    pub dry_run: bool,

    /// Upper bound on the size of one create request, in bytes.
    #[arg(long, env = "NETDEVD_MESSAGE_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    pub message_capacity: usize,
}

impl Config {
    pub fn link_poll_interval(&self) -> Duration {
        Duration::from_millis(self.link_poll_ms)
    }
}
