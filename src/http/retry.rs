//! Retrying transport for transient network and gateway failures.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::{Body, Request, Response, StatusCode};

use super::sender::Sender;

/// Number of retries performed after the first attempt.
pub const RETRY_COUNT: u32 = 3;

/// Delay before the first retry; doubled for every following retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RETRY_COUNT,
            base_delay: BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `retries` (zero based): `base_delay * 2^retries`.
    pub fn backoff(&self, retries: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retries))
    }
}

/// Returns true when the outcome of an attempt looks transient.
///
/// Any transport error is retried. Of the received responses only the gateway
/// family (502, 503, 504) is; everything else, 4xx included, is final.
pub fn should_retry(outcome: &Result<Response>) -> bool {
    match outcome {
        Err(_) => true,
        Ok(response) => matches!(
            response.status(),
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ),
    }
}

/// A [`Sender`] that replays a request on transient failure with exponential backoff.
///
/// The request body is buffered once up front and every attempt is sent with a
/// fresh body over the same bytes. The outcome of the last attempt is returned
/// exactly as the inner sender produced it.
#[derive(Debug, Clone)]
pub struct RetryTransport<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Sender> RetryTransport<S> {
    /// Wraps `inner` with the default policy (3 retries, 1s/2s/4s).
    pub fn new(inner: S) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: Sender> Sender for RetryTransport<S> {
    #[tracing::instrument(skip(self, request), fields(method = %request.method(), url = %request.url()))]
    async fn send(&self, mut request: Request) -> Result<Response> {
        let body = buffer_body(&mut request)?;
        let mut retries = 0;

        loop {
            let attempt = prepare_attempt(&request, body.as_ref())?;
            let outcome = self.inner.send(attempt).await;

            if retries >= self.policy.max_retries || !should_retry(&outcome) {
                debug!(
                    "{} {}: {} after {} attempt(s)",
                    request.method(),
                    request.url(),
                    describe(&outcome),
                    retries + 1
                );
                return outcome;
            }

            let delay = self.policy.backoff(retries);
            warn!(
                "{} {}: attempt {}/{} failed ({}), retrying in {:?}...",
                request.method(),
                request.url(),
                retries + 1,
                self.policy.max_retries + 1,
                describe(&outcome),
                delay
            );
            tokio::time::sleep(delay).await;

            drain(outcome).await;
            retries += 1;
        }
    }
}

/// Takes the body out of `request` and returns its bytes.
fn buffer_body(request: &mut Request) -> Result<Option<Bytes>> {
    let Some(body) = request.body_mut().take() else {
        return Ok(None);
    };
    match body.as_bytes() {
        Some(bytes) => Ok(Some(Bytes::copy_from_slice(bytes))),
        None => bail!("Request body is a stream and cannot be buffered for retries"),
    }
}

/// Builds the request for one attempt from the bodiless template.
fn prepare_attempt(template: &Request, body: Option<&Bytes>) -> Result<Request> {
    let mut attempt = template
        .try_clone()
        .context("Failed to clone request for sending")?;
    *attempt.body_mut() = body.cloned().map(Body::from);
    Ok(attempt)
}

/// Reads and discards the body of a response that is about to be retried.
async fn drain(outcome: Result<Response>) {
    if let Ok(response) = outcome {
        if let Err(e) = response.bytes().await {
            debug!("Failed to drain response body: {}", e);
        }
    }
}

fn describe(outcome: &Result<Response>) -> String {
    match outcome {
        Ok(response) => format!("HTTP {}", response.status()),
        Err(e) => format!("{:#}", e),
    }
}
