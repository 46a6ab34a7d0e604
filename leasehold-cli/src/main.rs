//! leasehold CLI - operator tooling for the rental catalog
//!
//! Provides:
//! - Schema setup and demo data (`init`, `seed-demo`)
//! - Catalog reads as JSON (`search`, `show`, `dashboard`, `featured`)
//! - The guarded rental transition (`rent`)
//! - Live pool diagnostics (`monitor`)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use leasehold_core::{Catalog, CatalogConfig};
use tracing::debug;

mod commands;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "leasehold",
    author,
    version,
    about = "Operator CLI for the leasehold rental catalog",
    long_about = "Inspect and operate a leasehold catalog: apply the schema, seed demo \
                  listings, search with filters, rent units and watch the connection pool."
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database URL (overrides the config file)
    #[arg(long, global = true, env = "LEASEHOLD_DATABASE_URL", value_name = "URL")]
    database_url: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the catalog schema if it does not exist
    Init,
    /// Insert demo users, features and listings
    SeedDemo,
    /// Search listings with optional filters
    Search(commands::catalog::SearchArgs),
    /// Show one listing with its images and features
    Show(commands::catalog::ShowArgs),
    /// Rent an AVAILABLE listing to a tenant
    Rent(commands::catalog::RentArgs),
    /// Portfolio summary for a landlord
    Dashboard(commands::catalog::DashboardArgs),
    /// Highest-priced available listings
    Featured(commands::catalog::FeaturedArgs),
    /// Log connection pool state until interrupted
    Monitor(commands::monitor::MonitorArgs),
}

/// Resolve configuration: file (if any), then CLI/env overrides.
fn load_config(cli: &Cli) -> Result<CatalogConfig> {
    let mut config = match &cli.config {
        Some(path) => CatalogConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => CatalogConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    let mut config = load_config(&cli)?;
    if let Commands::Monitor(args) = &cli.command {
        commands::monitor::configure(&mut config, args);
    }
    debug!(database_url = %config.database_url, "opening catalog");

    let catalog = Catalog::open(config)
        .await
        .context("failed to open catalog")?;
    let outcome = run(&catalog, cli.command).await;
    catalog.close().await;
    outcome
}

async fn run(catalog: &Catalog, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            println!("schema ready at {}", catalog.config().database_url);
            Ok(())
        }
        Commands::SeedDemo => commands::seed::run_seed_demo(catalog).await,
        Commands::Search(args) => commands::catalog::run_search(catalog, args).await,
        Commands::Show(args) => commands::catalog::run_show(catalog, args).await,
        Commands::Rent(args) => commands::catalog::run_rent(catalog, args).await,
        Commands::Dashboard(args) => commands::catalog::run_dashboard(catalog, args).await,
        Commands::Featured(args) => commands::catalog::run_featured(catalog, args).await,
        Commands::Monitor(_) => commands::monitor::run_monitor(catalog).await,
    }
}
