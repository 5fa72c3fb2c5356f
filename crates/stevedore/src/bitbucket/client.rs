//! Bitbucket Cloud API client: authenticated GETs with retry, and
//! cursor-paginated page streams.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::Retryable;
use base64::Engine;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::Page;
use crate::config::ConnectorConfig;
use crate::error::{Error, Result};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::retry::RetryConfig;

/// Base URL of the Bitbucket Cloud REST API.
pub const BASE_URL: &str = "https://api.bitbucket.org/2.0";

/// Liveness probe endpoint.
pub const PING_URL: &str = "https://api.bitbucket.org/2.0/user";

/// Page size requested on discovery endpoints.
pub const PAGE_SIZE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bitbucket Cloud API client.
///
/// The connection resource (transport + basic-auth header) is created once
/// in the constructor and shared by reference with every iterator; there is
/// no lazy initialization.
pub struct BitbucketClient {
    transport: Arc<dyn HttpTransport>,
    authorization: String,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl BitbucketClient {
    /// Create a client over the real reqwest transport.
    pub fn new(config: &ConnectorConfig, cancel: CancellationToken) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
        Ok(Self::with_transport(config, cancel, Arc::new(transport)))
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(
        config: &ConnectorConfig,
        cancel: CancellationToken,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let credentials = format!("{}:{}", config.username, config.app_password);
        let authorization = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes())
        );

        Self {
            transport,
            authorization,
            retry: RetryConfig::new(config.retry_count),
            cancel,
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The shared connection resource.
    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// The token that aborts in-flight calls and pending backoff sleeps.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn request(&self, url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: vec![
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), self.authorization.clone()),
            ],
        }
    }

    async fn send_once(&self, url: &str) -> Result<HttpResponse> {
        let response = self.transport.send(self.request(url)).await?;
        if !(200..300).contains(&response.status) {
            return Err(Error::Api {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).to_string(),
            });
        }
        Ok(response)
    }

    /// One authenticated GET with bounded exponential-backoff retry.
    ///
    /// Any failure (transport or non-2xx status) is retried until the
    /// attempt budget is exhausted, then the final error is returned. A
    /// disconnect-class error resets the transport before the next attempt.
    /// Cancellation aborts the call, including a pending backoff sleep.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let max_retries = self.retry.max_retries;
        let attempt = AtomicU32::new(0);

        let operation = || {
            attempt.fetch_add(1, Ordering::SeqCst);
            self.send_once(url)
        };

        let request = operation
            .retry(self.retry.clone().into_backoff())
            .when(|_: &Error| true)
            .notify(|err: &Error, dur: Duration| {
                if err.is_disconnect() {
                    self.transport.reset();
                }
                tracing::warn!(
                    "retry {} of {} for {} in {:?}: {}",
                    attempt.load(Ordering::SeqCst),
                    max_retries,
                    url,
                    dur,
                    err
                );
            });

        let request: Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send>> =
            Box::pin(request);
        match self.cancel.run_until_cancelled(request).await {
            Some(result) => result,
            None => Err(Error::Cancelled),
        }
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Lazy, finite stream of pages, following the `next` cursor until
    /// absent.
    ///
    /// Any error from the underlying call terminates the stream early with
    /// a logged warning instead of propagating: one bad page must not abort
    /// an entire sync. This is deliberately different from [`Self::get`],
    /// which returns the error after exhausting its budget.
    pub fn pages(&self, url: impl Into<String>) -> BoxStream<'_, Page> {
        let client = self;
        stream::unfold(Some(url.into()), move |state| async move {
            let url = state?;
            match client.get_json::<Page>(&url).await {
                Ok(page) => {
                    let next = page.next.clone();
                    Some((page, next))
                }
                Err(e) => {
                    tracing::warn!("skipping remaining pages from {url}: {e}");
                    None
                }
            }
        })
        .boxed()
    }

    /// Flatten [`Self::pages`] into a stream of the page items.
    pub fn page_items(&self, url: impl Into<String>) -> BoxStream<'_, Value> {
        self.pages(url)
            .map(|page| stream::iter(page.values))
            .flatten()
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataSourceKind;
    use crate::http::{HttpError, MockTransport};
    use serde_json::json;

    fn test_config() -> ConnectorConfig {
        ConnectorConfig {
            data_source: DataSourceKind::BitbucketCloud,
            username: "user".to_string(),
            app_password: "secret".to_string(),
            repositories: vec!["*".to_string()],
            retry_count: 3,
        }
    }

    fn fast_retry(max_retries: usize) -> RetryConfig {
        RetryConfig::new(max_retries).with_interval(Duration::from_millis(1))
    }

    fn client_with(transport: &MockTransport, retry: RetryConfig) -> BitbucketClient {
        BitbucketClient::with_transport(
            &test_config(),
            CancellationToken::new(),
            Arc::new(transport.clone()),
        )
        .with_retry(retry)
    }

    fn json_response(body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&body).expect("body should serialize"),
        }
    }

    #[tokio::test]
    async fn test_get_sends_basic_auth_and_json_headers() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        transport.push_response(HttpMethod::Get, url, json_response(json!({"ok": true})));

        let client = client_with(&transport, fast_retry(0));
        client.get(url).await.expect("request should succeed");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let auth = crate::http::header_get(&requests[0].headers, "authorization")
            .expect("authorization header");
        // base64("user:secret")
        assert_eq!(auth, "Basic dXNlcjpzZWNyZXQ=");
        assert_eq!(
            crate::http::header_get(&requests[0].headers, "accept"),
            Some("application/json")
        );
        assert_eq!(
            crate::http::header_get(&requests[0].headers, "content-type"),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_get_retry_exhaustion_makes_budget_plus_one_attempts() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        // No response registered: every attempt fails.

        let client = client_with(&transport, fast_retry(3));
        let err = client.get(url).await.expect_err("exhaustion should error");

        assert!(matches!(err, Error::Http(HttpError::NoMockResponse { .. })));
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_get_retries_non_success_statuses() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 500,
                headers: Vec::new(),
                body: b"boom".to_vec(),
            },
        );
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 500,
                headers: Vec::new(),
                body: b"boom".to_vec(),
            },
        );
        transport.push_response(HttpMethod::Get, url, json_response(json!({"ok": true})));

        let client = client_with(&transport, fast_retry(3));
        client.get(url).await.expect("third attempt should succeed");

        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_get_returns_api_error_when_budget_spent_on_statuses() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        for _ in 0..2 {
            transport.push_response(
                HttpMethod::Get,
                url,
                HttpResponse {
                    status: 401,
                    headers: Vec::new(),
                    body: b"unauthorized".to_vec(),
                },
            );
        }

        let client = client_with(&transport, fast_retry(1));
        let err = client.get(url).await.expect_err("401s should error");

        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_resets_transport_before_next_attempt() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        transport.push_error(
            HttpMethod::Get,
            url,
            HttpError::Disconnected("peer closed".to_string()),
        );
        transport.push_response(HttpMethod::Get, url, json_response(json!({"ok": true})));

        let client = client_with(&transport, fast_retry(2));
        client.get(url).await.expect("retry should succeed");

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.resets(), 1);
    }

    #[tokio::test]
    async fn test_plain_transport_error_does_not_reset() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        transport.push_error(
            HttpMethod::Get,
            url,
            HttpError::Transport("timed out".to_string()),
        );
        transport.push_response(HttpMethod::Get, url, json_response(json!({"ok": true})));

        let client = client_with(&transport, fast_retry(2));
        client.get(url).await.expect("retry should succeed");

        assert_eq!(transport.resets(), 0);
    }

    #[tokio::test]
    async fn test_connection_reuse_across_calls() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        transport.push_response(HttpMethod::Get, url, json_response(json!({"ok": 1})));
        transport.push_response(HttpMethod::Get, url, json_response(json!({"ok": 2})));

        let client = client_with(&transport, fast_retry(0));
        let first = Arc::clone(client.transport());
        client.get(url).await.expect("first call");
        let second = Arc::clone(client.transport());
        client.get(url).await.expect("second call");

        assert!(Arc::ptr_eq(&first, &second));
        // Both calls went through the one mock.
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_pending_backoff_sleep() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        // No response registered; the first failure puts the client into a
        // long backoff sleep.
        let cancel = CancellationToken::new();
        let client = BitbucketClient::with_transport(
            &test_config(),
            cancel.clone(),
            Arc::new(transport.clone()),
        )
        .with_retry(RetryConfig::new(3).with_interval(Duration::from_secs(30)));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), client.get(url))
            .await
            .expect("cancellation should return promptly")
            .expect_err("cancelled call should error");

        assert!(matches!(err, Error::Cancelled));
        canceller.await.expect("canceller task");
    }

    #[tokio::test]
    async fn test_get_json_decode_error_is_not_retried() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/user";
        transport.push_response(
            HttpMethod::Get,
            url,
            HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"not json".to_vec(),
            },
        );

        let client = client_with(&transport, fast_retry(3));
        let err = client
            .get_json::<Page>(url)
            .await
            .expect_err("bad body should error");

        assert!(matches!(err, Error::Json(_)));
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_pages_follows_cursor_until_absent() {
        let transport = MockTransport::new();
        let first_url = "https://api.bitbucket.org/2.0/workspaces?pagelen=100";
        let second_url = "https://api.bitbucket.org/2.0/workspaces?pagelen=100&page=2";

        transport.push_response(
            HttpMethod::Get,
            first_url,
            json_response(json!({
                "values": [{"slug": "one"}],
                "next": second_url,
            })),
        );
        transport.push_response(
            HttpMethod::Get,
            second_url,
            json_response(json!({
                "values": [{"slug": "two"}],
            })),
        );

        let client = client_with(&transport, fast_retry(0));
        let pages: Vec<Page> = client.pages(first_url).collect().await;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].values[0]["slug"], json!("one"));
        assert_eq!(pages[1].values[0]["slug"], json!("two"));
        assert!(pages[1].next.is_none());

        let requests = transport.requests();
        let urls: Vec<&str> = requests
            .iter()
            .map(|r| r.url.as_str())
            .collect::<Vec<_>>();
        assert_eq!(urls, vec![first_url, second_url]);
    }

    #[tokio::test]
    async fn test_pages_truncates_silently_after_retry_budget() {
        let transport = MockTransport::new();
        let first_url = "https://api.bitbucket.org/2.0/workspaces?pagelen=100";
        let second_url = "https://api.bitbucket.org/2.0/workspaces?pagelen=100&page=2";

        transport.push_response(
            HttpMethod::Get,
            first_url,
            json_response(json!({
                "values": [{"slug": "one"}],
                "next": second_url,
            })),
        );
        // Nothing registered for the second page: it fails every attempt.

        let client = client_with(&transport, fast_retry(1));
        let pages: Vec<Page> = client.pages(first_url).collect().await;

        // The stream ends after the first page instead of erroring.
        assert_eq!(pages.len(), 1);

        // The failing page still burned its full retry budget.
        let second_attempts = transport
            .requests()
            .iter()
            .filter(|r| r.url == second_url)
            .count();
        assert_eq!(second_attempts, 2);
    }

    #[tokio::test]
    async fn test_page_items_flattens_values() {
        let transport = MockTransport::new();
        let url = "https://api.bitbucket.org/2.0/workspaces?pagelen=100";
        transport.push_response(
            HttpMethod::Get,
            url,
            json_response(json!({
                "values": [{"slug": "a"}, {"slug": "b"}],
            })),
        );

        let client = client_with(&transport, fast_retry(0));
        let items: Vec<Value> = client.page_items(url).collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["slug"], json!("a"));
        assert_eq!(items[1]["slug"], json!("b"));
    }
}
