use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::error;
use weekly_report::app::{self, DEFAULT_CONFIG_PATH};
use weekly_report::report::Category;
use weekly_report::runtime::RealRuntime;

/// weekly-report - fetch weekly report data from the documents API
///
/// Reads the API host and methods from a YAML config file and the auth token
/// from the AUTH_TOKEN environment variable, then prints the fetched
/// categories as JSON.
///
/// Examples:
///   AUTH_TOKEN=... weekly-report --config configs/config.yaml
#[derive(Parser, Debug)]
#[command(author, version = env!("WEEKLY_REPORT_VERSION"), about)]
struct Cli {
    /// Path to the YAML config file (also via WEEKLY_REPORT_CONFIG)
    #[arg(
        long = "config",
        short = 'c',
        env = "WEEKLY_REPORT_CONFIG",
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let categories = app::run(&RealRuntime, &cli.config).await?;
    print_categories(&categories)
}

fn print_categories(categories: &[Category]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(categories)?);
    Ok(())
}
