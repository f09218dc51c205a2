mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "civicfeeds", version)]
#[command(about = "Scrape civic record feeds (police activity, crime data, property sales) into CSV files")]
struct Cli {
    /// Path to the YAML config file (default: $CIVICFEEDS_CONFIG or config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scrapers and write their CSV output
    Update(commands::update::UpdateArgs),
    /// Show the data directories and the CSV files in them
    Status,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.parse()?)
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config_path = civicfeeds_lib::config::config_path(cli.config.as_deref());

    match &cli.command {
        Commands::Update(args) => commands::update::run(args, &config_path).await?,
        Commands::Status => commands::status::run(&config_path)?,
    }

    Ok(())
}
