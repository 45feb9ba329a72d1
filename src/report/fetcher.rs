use anyhow::{Context, Result};
use bytes::Bytes;
use log::debug;
use reqwest::Client;

use super::types::{CategoriesResponse, Category};
use crate::config::{MethodConfig, WeeklyReportConfig};
use crate::http::{ApiClient, RequestSpec, RetryTransport, Sender};

/// Locale requested for human-readable titles.
pub const LOCALE: &str = "ru";

/// Returned when a fetcher is constructed without an auth token.
#[derive(Debug)]
pub struct MissingCredential;

impl std::fmt::Display for MissingCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Missing auth token: the report API requires a credential")
    }
}

impl std::error::Error for MissingCredential {}

/// Fetches report sections using the configured methods and an auth token.
pub struct ReportFetcher<S = RetryTransport<Client>> {
    client: ApiClient<S>,
    config: WeeklyReportConfig,
    token: String,
}

impl ReportFetcher {
    /// Builds a fetcher for `config` using the default retrying client.
    ///
    /// Fails with [`MissingCredential`] when `token` is absent or empty.
    pub fn new(config: &WeeklyReportConfig, token: Option<String>) -> Result<Self> {
        let token = require_token(token)?;
        let client = ApiClient::new(config.host.clone())?;
        Ok(Self {
            client,
            config: config.clone(),
            token,
        })
    }
}

impl<S: Sender> ReportFetcher<S> {
    /// Builds a fetcher over an existing client; `config.host` is not used.
    pub fn with_client(
        client: ApiClient<S>,
        config: WeeklyReportConfig,
        token: Option<String>,
    ) -> Result<Self> {
        let token = require_token(token)?;
        Ok(Self {
            client,
            config,
            token,
        })
    }

    /// Fetches the category list from the first configured method.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_categories(&self) -> Result<Vec<Category>> {
        let method = self
            .config
            .methods
            .first()
            .context("No report methods configured")?;

        debug!("Fetching categories from {}...", method.route);

        let spec = self.authorized_get(method).query("locale", LOCALE);
        let body = self
            .client
            .request(spec)
            .await
            .with_context(|| format!("Failed to call method '{}'", method.method))?;

        let response: CategoriesResponse =
            serde_json::from_slice(&body).context("Failed to decode categories response")?;
        let categories = response.into_categories();

        debug!("Fetched {} categories", categories.len());
        Ok(categories)
    }

    /// Calls the configured method `name` with GET and returns the raw body.
    #[tracing::instrument(skip(self, query))]
    pub async fn fetch_method(&self, name: &str, query: &[(&str, &str)]) -> Result<Bytes> {
        let method = self
            .config
            .method(name)
            .with_context(|| format!("Unknown report method '{}'", name))?;

        let spec = query
            .iter()
            .fold(self.authorized_get(method), |spec, (k, v)| spec.query(*k, *v));

        self.client
            .request(spec)
            .await
            .with_context(|| format!("Failed to call method '{}'", name))
    }

    fn authorized_get(&self, method: &MethodConfig) -> RequestSpec {
        let spec = RequestSpec::get(method.route.clone())
            .header("Authorization", self.token.clone());
        match method.timeout {
            Some(timeout) => spec.timeout(timeout),
            None => spec,
        }
    }
}

fn require_token(token: Option<String>) -> Result<String> {
    match token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(MissingCredential.into()),
    }
}
