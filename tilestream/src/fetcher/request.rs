//! Fetch request value types.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;

use super::error::{FetchError, FetcherError};

/// Opaque caller data carried through a fetch and handed back on completion.
pub type FetchContext = Arc<dyn Any + Send + Sync>;

/// Completion callback. Called at most once; never called on cancel.
pub type FetchCallback = Box<dyn FnOnce(FetchOutcome) + Send + 'static>;

/// Where to fetch a tile from.
///
/// Headers are an ordered list so that the request sent on the wire is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLocator {
    url: Url,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl TileLocator {
    /// Parses an absolute `http` or `https` URL.
    pub fn parse(locator: &str) -> Result<Self, FetcherError> {
        let url = Url::parse(locator).map_err(|e| FetcherError::InvalidLocator {
            locator: locator.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(url)
    }

    /// Wraps an already parsed URL, checking the scheme and host.
    pub fn from_url(url: Url) -> Result<Self, FetcherError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetcherError::InvalidLocator {
                locator: url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if !url.has_host() {
            return Err(FetcherError::InvalidLocator {
                locator: url.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(Self {
            url,
            headers: Vec::new(),
            timeout: None,
        })
    }

    /// Appends a header. Order is preserved.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends several headers in order.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets a per-request timeout for the network operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FetcherError> {
        if timeout.is_zero() {
            return Err(FetcherError::InvalidTimeout);
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Display for TileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// One tile to retrieve.
#[derive(Clone)]
pub struct FetchRequest {
    locator: TileLocator,
    cache_file: Option<PathBuf>,
    priority: f64,
    context: Option<FetchContext>,
}

impl FetchRequest {
    pub fn new(locator: TileLocator) -> Self {
        Self {
            locator,
            cache_file: None,
            priority: 0.0,
            context: None,
        }
    }

    /// Cache file to read before going remote and to write after.
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_file = Some(path.into());
        self
    }

    /// Scheduling priority; higher goes first. NaN is treated as 0.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = if priority.is_nan() { 0.0 } else { priority };
        self
    }

    pub fn with_context(mut self, context: FetchContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn locator(&self) -> &TileLocator {
        &self.locator
    }

    pub fn cache_file(&self) -> Option<&Path> {
        self.cache_file.as_deref()
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn context(&self) -> Option<&FetchContext> {
        self.context.as_ref()
    }

    pub(crate) fn into_parts(self) -> (TileLocator, Option<PathBuf>, Option<FetchContext>) {
        (self.locator, self.cache_file, self.context)
    }
}

impl fmt::Debug for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchRequest")
            .field("locator", &self.locator)
            .field("cache_file", &self.cache_file)
            .field("priority", &self.priority)
            .field("has_context", &self.context.is_some())
            .finish()
    }
}

/// Identifies a submitted request for cancellation and status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchHandle(u64);

impl FetchHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FetchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a successful result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
}

/// What a completion callback receives.
#[derive(Clone)]
pub struct FetchOutcome {
    pub handle: FetchHandle,
    pub context: Option<FetchContext>,
    pub result: Result<(Bytes, FetchSource), FetchError>,
}

impl FetchOutcome {
    /// The fetched bytes, if the fetch succeeded.
    pub fn data(&self) -> Option<&Bytes> {
        self.result.as_ref().ok().map(|(data, _)| data)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Downcasts the caller context.
    pub fn context_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.as_ref().and_then(|c| c.downcast_ref::<T>())
    }
}

impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match &self.result {
            Ok((data, source)) => format!("Ok({} bytes from {:?})", data.len(), source),
            Err(e) => format!("Err({})", e),
        };
        f.debug_struct("FetchOutcome")
            .field("handle", &self.handle)
            .field("result", &result)
            .finish()
    }
}
