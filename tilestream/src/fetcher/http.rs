//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::error::{FetchError, FetcherError};
use super::request::TileLocator;

/// Default User-Agent string for HTTP requests.
///
/// Some tile servers reject requests without one.
pub const DEFAULT_USER_AGENT: &str = concat!("tilestream/", env!("CARGO_PKG_VERSION"));

/// Default timeout applied when a locator carries none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for asynchronous tile downloads.
///
/// This is the seam between the scheduler and the network: the fetcher
/// only ever calls [`get`](AsyncHttpClient::get), so tests can substitute a
/// mock that never touches a socket.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs a GET for `locator`, honouring its headers and timeout.
    fn get(&self, locator: &TileLocator) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeout and user agent.
    pub fn new() -> Result<Self, FetcherError> {
        Self::with_options(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Creates a client with a custom default timeout and user agent.
    ///
    /// - Connection pool sized for many parallel tile requests
    /// - TCP keepalive to keep connections warm between view changes
    pub fn with_options(timeout: Duration, user_agent: &str) -> Result<Self, FetcherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FetcherError::HttpClient(e.to_string()))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, locator: &TileLocator) -> Result<Bytes, FetchError> {
        let url = locator.url().as_str();
        trace!(url, "HTTP GET request starting");

        let mut request = self.client.get(locator.url().clone());
        for (name, value) in locator.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = locator.timeout() {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(resp) => {
                debug!(url, status = resp.status().as_u16(), "HTTP response received");
                resp
            }
            Err(e) => {
                warn!(
                    url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(classify(url, e));
            }
        };

        // Check HTTP status
        if !response.status().is_success() {
            warn!(url, status = response.status().as_u16(), "HTTP error status");
            return Err(FetchError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        match response.bytes().await {
            Ok(bytes) => {
                trace!(url, bytes = bytes.len(), "HTTP response body read");
                Ok(bytes)
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to read response body");
                Err(classify(url, e))
            }
        }
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http(e.to_string())
    }
}
