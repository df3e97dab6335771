//! Fetcher error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a fetcher or its requests.
///
/// These are reported synchronously to the caller; nothing is created.
#[derive(Debug, Error)]
pub enum FetcherError {
    /// A fetcher needs at least one connection.
    #[error("number of connections must be at least 1")]
    InvalidConnections,

    /// Construction happened outside a Tokio runtime.
    #[error("no Tokio runtime available: {0}")]
    NoRuntime(String),

    /// The HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// A locator that is not an absolute http(s) URL with a host.
    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// Timeouts must be positive.
    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    /// A tile URL template that cannot produce valid locators.
    #[error("invalid tile template: {0}")]
    InvalidTemplate(String),

    /// A tile level the source does not serve.
    #[error("zoom level {level} outside {min}..={max}")]
    ZoomOutOfRange { level: u32, min: u32, max: u32 },

    /// The configuration file could not be read or parsed.
    #[error("failed to read config {path}: {reason}")]
    ConfigRead { path: PathBuf, reason: String },

    /// A configuration value is out of range or malformed.
    #[error("invalid value '{value}' for {key}: {reason}")]
    ConfigValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Failure of one remote fetch, delivered through the request's callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The request's timeout elapsed.
    #[error("request to {url} timed out")]
    Timeout { url: String },
}
