//! The "send one request, get one response" seam the retry layer wraps.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Request, Response};

/// Performs a single HTTP round trip.
///
/// A received response is `Ok` regardless of its status code; only failures to
/// obtain a response at all (connect, timeout, protocol) are `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl Sender for Client {
    #[tracing::instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.execute(request).await?)
    }
}
