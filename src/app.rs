//! Top-level wiring: config, credential, fetcher.

use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

use crate::config;
use crate::report::{Category, ReportFetcher};
use crate::runtime::Runtime;

/// Environment variable holding the upstream auth token.
pub const AUTH_TOKEN_ENV: &str = "AUTH_TOKEN";

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Loads the config at `config_path`, then fetches the report categories.
#[tracing::instrument(skip(runtime))]
pub async fn run<R: Runtime>(runtime: &R, config_path: &Path) -> Result<Vec<Category>> {
    let config = config::load(runtime, config_path)?;

    let token = runtime.env_var(AUTH_TOKEN_ENV).ok();
    if token.is_none() {
        debug!("{} is not set", AUTH_TOKEN_ENV);
    }

    let fetcher = ReportFetcher::new(&config.weekly_report, token)
        .with_context(|| format!("Failed to create report client (is {} set?)", AUTH_TOKEN_ENV))?;

    fetcher
        .fetch_categories()
        .await
        .context("Failed to fetch categories")
}
