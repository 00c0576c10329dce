//! # Engage API Main Entry Point
//!
//! CLI entry point for the Engage service: `engage serve` runs the API and
//! background services, `engage migrate` applies pending migrations and
//! exits.

use clap::{Parser, Subcommand};
use engage::migration::{Migrator, MigratorTrait};
use engage::{config::ConfigLoader, db, seeds, server::run_server, telemetry};

#[derive(Parser)]
#[command(name = "engage", about = "Social engagement auto-responder service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and background services (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load()?;

    telemetry::init_tracing(&config)?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    config.validate()?;

    let pool = db::init_pool(&config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            Migrator::up(&pool, None).await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Command::Serve => {
            Migrator::up(&pool, None).await?;
            seeds::seed_platforms(&pool).await?;
            run_server(config, pool).await
        }
    }
}
