//! Beacon Relay CLI Entry Point
//!
//! This is the main entry point for the beacon-relay binary.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use beacon_relay::cli::config::Config;
use beacon_relay::connection::websocket::RelayServer;
use beacon_relay::registry::ConnectionRegistry;
use beacon_relay::stimulus::StimulusDriver;
use beacon_relay::validator::SchemaValidator;

#[derive(Parser)]
#[command(name = "beacon-relay")]
#[command(author, version, about = "Beacon Relay - provider/consumer pub/sub relay")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/relay.toml")]
    config: PathBuf,

    /// Listen port (overrides the configuration file)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Start,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    // Initialize logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Start => {
            start_relay(&cli, config).await?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}

async fn start_relay(cli: &Cli, mut config: Config) -> Result<()> {
    info!("Starting Beacon Relay...");

    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let registry = ConnectionRegistry::new();
    let validator = Arc::new(SchemaValidator);

    let server = RelayServer::bind(&config.listen_addr(), registry.clone(), validator).await?;
    info!(addr = %server.local_addr()?, "relay listening");

    // The external harness waits for this exact line on stdout.
    println!("SERVER READY");

    let driver = StimulusDriver::new(registry);

    tokio::select! {
        result = server.run() => result?,
        result = driver.run() => {
            result?;
            info!("stimulus input closed, shutting down");
        }
    }

    Ok(())
}

fn show_version() {
    println!("beacon-relay {}", env!("CARGO_PKG_VERSION"));
    println!("Provider/consumer pub/sub relay");
    println!();
    println!("Features:");
    println!("  - Schema-validated event, sensor and control packets");
    println!("  - Per-role provider and consumer channels");
    println!("  - Line-oriented stimulus command input");
}
