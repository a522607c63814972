//! ClipBridge - clipboard synchronization bridge
//!
//! This is the main entry point for the relay and peer processes.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipbridge::cli::{Cli, CliHandler};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut handler = CliHandler::new(cli.config.clone());

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        handler.configured_log_level()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("clipbridge={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "ClipBridge v{} ({}, built {})",
        clipbridge::VERSION,
        env!("TARGET"),
        env!("BUILD_DATE")
    );

    handler.handle_command(cli.command).await?;

    Ok(())
}
