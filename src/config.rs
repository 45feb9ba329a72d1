//! Report configuration loaded from YAML.
//!
//! ```yaml
//! weekly-report-config:
//!   host: "https://api.example.com"
//!   methods:
//!     - method: "categories"
//!       route: "/api/v1/documents/categories"
//!       timeout: 10s
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(rename = "weekly-report-config")]
    pub weekly_report: WeeklyReportConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeeklyReportConfig {
    /// Base URL every route is appended to.
    pub host: String,
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
}

/// One named API call of the report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodConfig {
    /// Logical name, e.g. `categories`.
    pub method: String,
    pub route: String,
    /// Per-attempt deadline, written as `10s`, `1m 30s`, ...
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl WeeklyReportConfig {
    /// Looks up a configured method by its logical name.
    pub fn method(&self, name: &str) -> Option<&MethodConfig> {
        self.methods.iter().find(|m| m.method == name)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s).context("Failed to parse config")
    }
}

/// Reads and parses the config file at `path`.
#[tracing::instrument(skip(runtime))]
pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Config> {
    debug!("Loading config from {:?}...", path);
    let contents = runtime
        .read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: Config = contents
        .parse()
        .with_context(|| format!("Invalid config file {:?}", path))?;
    debug!(
        "Loaded {} method(s) for {}",
        config.weekly_report.methods.len(),
        config.weekly_report.host
    );
    Ok(config)
}
