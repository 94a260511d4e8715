mod cmd;
mod config;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{Cli, Commands};

/// `RUST_LOG` wins; otherwise info for the tool and debug for the bus library.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gw_event_bus=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let result = match Cli::parse().command {
        Commands::Ping(args) => cmd::ping::run(args).await,
        Commands::Tail(args) => cmd::tail::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "bus-tail failed");
            ExitCode::FAILURE
        }
    }
}
