//! HTTP layer: a sender seam, a retrying transport over it, and the API client.

mod client;
mod retry;
mod sender;

pub use client::{ApiClient, RequestSpec, USER_AGENT};
pub use retry::{BASE_DELAY, RETRY_COUNT, RetryPolicy, RetryTransport, should_retry};
pub use sender::Sender;

#[cfg(test)]
pub use sender::MockSender;
