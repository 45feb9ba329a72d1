//! Request-building API client on top of the retrying transport.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, warn};
use reqwest::{
    Body, Client, Method, Request, Url,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};

use super::retry::RetryTransport;
use super::sender::Sender;

/// User agent sent by the default client.
pub const USER_AGENT: &str = concat!("weekly-report/", env!("WEEKLY_REPORT_VERSION"));

/// Everything needed to issue one API call.
///
/// Built per call and consumed by [`ApiClient::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Path appended verbatim to the client host.
    pub route: String,
    pub method: Method,
    /// Sent for every method except GET.
    pub body: Option<Bytes>,
    /// Appended to the URL for GET only, in this order.
    pub query: Vec<(String, String)>,
    /// Applied over the default `Content-Type: application/json`.
    pub headers: Vec<(String, String)>,
    /// Deadline for each individual attempt.
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(route: impl Into<String>, method: Method) -> Self {
        Self {
            route: route.into(),
            method,
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(route, Method::GET)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(route, Method::POST)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Client bound to one API host.
///
/// Every call goes through the configured [`Sender`], which by default is a
/// [`RetryTransport`] over a plain reqwest [`Client`].
#[derive(Debug, Clone)]
pub struct ApiClient<S = RetryTransport<Client>> {
    host: String,
    sender: S,
}

impl ApiClient {
    /// Creates a client for `host` using the default retrying transport.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_sender(host, RetryTransport::new(client)))
    }
}

impl<S: Sender> ApiClient<S> {
    /// Creates a client for `host` that sends through `sender`.
    pub fn with_sender(host: impl Into<String>, sender: S) -> Self {
        Self {
            host: host.into(),
            sender,
        }
    }

    /// Sends the request described by `spec` and returns the raw response body.
    ///
    /// Any response that arrives is returned as bytes, whatever its status;
    /// only build, transport and body-read failures are errors.
    #[tracing::instrument(skip(self, spec), fields(method = %spec.method, route = %spec.route))]
    pub async fn request(&self, spec: RequestSpec) -> Result<Bytes> {
        let request = self
            .build_request(spec)
            .context("Failed to create request")?;

        debug!("{} {}...", request.method(), request.url());

        let response = self
            .sender
            .send(request)
            .await
            .context("Failed to perform request")?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} responded with HTTP {}", response.url(), status);
        }

        let body = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        debug!("Received {} bytes (HTTP {})", body.len(), status);
        Ok(body)
    }

    fn build_request(&self, spec: RequestSpec) -> Result<Request> {
        let full_url = format!("{}{}", self.host, spec.route);
        let mut url =
            Url::parse(&full_url).with_context(|| format!("Invalid URL: {}", full_url))?;

        let is_get = spec.method == Method::GET;
        if is_get && !spec.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&spec.query);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &spec.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("Invalid header name: {}", name))?;
            let mut value = HeaderValue::from_str(value)
                .with_context(|| format!("Invalid value for header {}", name))?;
            if name == AUTHORIZATION {
                value.set_sensitive(true);
            }
            headers.insert(name, value);
        }

        let mut request = Request::new(spec.method, url);
        *request.headers_mut() = headers;
        *request.timeout_mut() = spec.timeout;
        if !is_get {
            *request.body_mut() = spec.body.map(Body::from);
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::retry::RetryPolicy;
    use crate::http::sender::MockSender;
    use anyhow::anyhow;
    use mockall::Sequence;
    use mockito::Matcher;

    const HOST: &str = "http://localhost:8080";

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        ::http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    fn mock_client() -> ApiClient<MockSender> {
        ApiClient::with_sender(HOST, MockSender::new())
    }

    fn fast_client(host: String) -> ApiClient {
        let transport = RetryTransport::with_policy(
            Client::new(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        ApiClient::with_sender(host, transport)
    }

    #[test]
    fn test_request_spec_builder() {
        let spec = RequestSpec::post("/items")
            .body("{}")
            .query("page", "1")
            .header("X-Id", "7")
            .timeout(Duration::from_secs(5));

        assert_eq!(spec.method, Method::POST);
        assert_eq!(spec.route, "/items");
        assert_eq!(spec.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(spec.query, vec![("page".to_string(), "1".to_string())]);
        assert_eq!(spec.headers, vec![("X-Id".to_string(), "7".to_string())]);
        assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_build_get_appends_encoded_query_in_order() {
        let spec = RequestSpec::get("/api/v1/documents/categories")
            .query("locale", "ru")
            .query("q", "a b&c")
            .query("empty", "");
        let request = mock_client().build_request(spec).unwrap();

        assert_eq!(
            request.url().as_str(),
            "http://localhost:8080/api/v1/documents/categories?locale=ru&q=a+b%26c&empty="
        );
    }

    #[test]
    fn test_build_get_without_query_has_no_query_string() {
        let request = mock_client()
            .build_request(RequestSpec::get("/plain"))
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:8080/plain");
        assert_eq!(request.url().query(), None);
    }

    #[test]
    fn test_build_non_get_ignores_query() {
        let spec = RequestSpec::post("/items").query("locale", "ru").body("x");
        let request = mock_client().build_request(spec).unwrap();
        assert_eq!(request.url().query(), None);
        assert_eq!(request.body().and_then(|b| b.as_bytes()), Some(&b"x"[..]));
    }

    #[test]
    fn test_build_get_ignores_body() {
        let spec = RequestSpec::get("/items").body("ignored");
        let request = mock_client().build_request(spec).unwrap();
        assert!(request.body().is_none());
    }

    #[test]
    fn test_build_sets_default_content_type() {
        let request = mock_client()
            .build_request(RequestSpec::get("/"))
            .unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_build_caller_headers_override_default() {
        let spec = RequestSpec::post("/upload")
            .header("Content-Type", "text/plain")
            .header("Authorization", "secret-token");
        let request = mock_client().build_request(spec).unwrap();

        assert_eq!(request.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(request.headers().get_all(CONTENT_TYPE).iter().count(), 1);
        assert_eq!(request.headers()[AUTHORIZATION], "secret-token");
        assert!(request.headers()[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_build_applies_timeout() {
        let spec = RequestSpec::get("/").timeout(Duration::from_secs(10));
        let request = mock_client().build_request(spec).unwrap();
        assert_eq!(request.timeout(), Some(&Duration::from_secs(10)));
    }

    #[test]
    fn test_build_rejects_invalid_url() {
        let client = ApiClient::with_sender("not a url", MockSender::new());
        assert!(client.build_request(RequestSpec::get("/x")).is_err());
    }

    #[tokio::test]
    async fn test_request_invalid_url_is_not_sent() {
        let mut sender = MockSender::new();
        sender.expect_send().never();
        let client = ApiClient::with_sender("::bad::", sender);

        let err = client.request(RequestSpec::get("/x")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to create request"));
    }

    #[tokio::test]
    async fn test_request_invalid_header_is_not_sent() {
        let mut sender = MockSender::new();
        sender.expect_send().never();
        let client = ApiClient::with_sender(HOST, sender);

        let spec = RequestSpec::get("/x").header("bad header", "v");
        let err = client.request(spec).await.unwrap_err();
        assert!(err.to_string().contains("Failed to create request"));
    }

    #[tokio::test]
    async fn test_request_send_failure_has_context() {
        let mut sender = MockSender::new();
        sender
            .expect_send()
            .times(1)
            .returning(|_| Err(anyhow!("connection refused")));
        let client = ApiClient::with_sender(HOST, sender);

        let err = client.request(RequestSpec::get("/x")).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to perform request");
        assert!(format!("{:#}", err).contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_recovers_after_two_transport_errors() {
        let mut sender = MockSender::new();
        let mut seq = Sequence::new();
        sender
            .expect_send()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow!("connection reset")));
        sender
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, r#"{"ok":true}"#)));

        let client = ApiClient::with_sender(HOST, RetryTransport::new(sender));
        let body = client.request(RequestSpec::get("/status")).await.unwrap();

        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_get_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/test-get")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"{"message": "GET request success"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let body = client.request(RequestSpec::get("/test-get")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], br#"{"message": "GET request success"}"#);
    }

    #[tokio::test]
    async fn test_get_request_with_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("locale".into(), "ru".into()),
                Matcher::UrlEncoded("q".into(), "weekly report".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let body = client
            .request(
                RequestSpec::get("/search")
                    .query("locale", "ru")
                    .query("q", "weekly report"),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn test_post_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/test-post")
            .match_header("content-type", "application/json")
            .match_header("authorization", "Bearer testtoken")
            .match_body(r#"{"title": "test", "body": "content"}"#)
            .with_status(200)
            .with_body(r#"{"message": "POST request success"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let spec = RequestSpec::post("/test-post")
            .body(r#"{"title": "test", "body": "content"}"#)
            .header("Authorization", "Bearer testtoken");
        let body = client.request(spec).await.unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], br#"{"message": "POST request success"}"#);
    }

    #[tokio::test]
    async fn test_invalid_route_returns_body_not_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/invalid-route")
            .with_status(404)
            .with_body(r#"{"error": "Not found"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(server.url()).unwrap();
        let body = client
            .request(RequestSpec::get("/invalid-route"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], br#"{"error": "Not found"}"#);
    }

    #[tokio::test]
    async fn test_server_error_outside_retry_set_is_returned_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/boom")
            .with_status(500)
            .with_body("internal")
            .expect(1)
            .create_async()
            .await;

        let client = fast_client(server.url());
        let body = client.request(RequestSpec::get("/boom")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(&body[..], b"internal");
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_after_retries() {
        let client = fast_client("http://127.0.0.1:1".to_string());
        let err = client.request(RequestSpec::get("/x")).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to perform request");
    }

    #[tokio::test]
    async fn test_truncated_body_fails_at_read_stage() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            // Promise 100 bytes, send 3, then hang up.
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc")
                .await
                .unwrap();
        });

        let client = ApiClient::new(format!("http://{}", addr)).unwrap();
        let err = client.request(RequestSpec::get("/x")).await.unwrap_err();
        server.await.unwrap();

        assert_eq!(err.to_string(), "Failed to read response body");
    }
}
