use clap::{Args, Parser, Subcommand};

use gw_event_bus::BusConfig;

use crate::error::TailError;

#[derive(Parser)]
#[command(name = "bus-tail", about = "Inspect gw-event-bus topics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check that the broker is reachable and list its nodes
    Ping(ConfigArgs),
    /// Log every message of every topic until Ctrl+C
    Tail(TailArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "bus.toml", env = "BUS_CONFIG")]
    pub config: String,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<BusConfig, TailError> {
        let config = BusConfig::load(&self.config)?;
        tracing::info!(config = %self.config, address = %config.address(), "loaded config");
        Ok(config)
    }
}

#[derive(Args, Clone, Debug)]
pub struct TailArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Print full message bodies instead of a one-line summary
    #[arg(long)]
    pub verbose: bool,

    /// Give up waiting for in-flight handlers after this many seconds
    #[arg(long, default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}
