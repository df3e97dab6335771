//! Remote tile sources described by a URL template.
//!
//! A [`RemoteTileInfo`] turns a quadtree [`Node`] into a ready-to-submit
//! [`FetchRequest`]: the URL comes from a `{z}/{x}/{y}` template and the
//! cache file, if a cache directory is set, is `<cache_dir>/<z>_<x>_<y>`
//! plus the template's file extension.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::{FetchContext, FetchRequest, FetcherError, TileLocator};
use crate::quadtree::{Node, MAX_NODE_LEVEL};

/// Placeholders every template must contain.
const PLACEHOLDERS: [&str; 3] = ["{x}", "{y}", "{z}"];

/// A remote tile pyramid and how to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTileInfo {
    base_url: String,
    min_zoom: u32,
    max_zoom: u32,
    timeout: Option<Duration>,
    cache_dir: Option<PathBuf>,
    headers: Vec<(String, String)>,
    extension: Option<String>,
}

impl RemoteTileInfo {
    /// Describes a source serving levels `min_zoom..=max_zoom`.
    ///
    /// `base_url` must contain `{x}`, `{y}` and `{z}` and must expand to an
    /// absolute http(s) URL.
    pub fn new(
        base_url: impl Into<String>,
        min_zoom: u32,
        max_zoom: u32,
    ) -> Result<Self, FetcherError> {
        let base_url = base_url.into();

        if let Some(missing) = PLACEHOLDERS.iter().find(|p| !base_url.contains(*p)) {
            return Err(FetcherError::InvalidTemplate(format!(
                "'{}' is missing {}",
                base_url, missing
            )));
        }
        if min_zoom > max_zoom || max_zoom > MAX_NODE_LEVEL {
            return Err(FetcherError::InvalidTemplate(format!(
                "zoom range {}..={} is invalid",
                min_zoom, max_zoom
            )));
        }

        // A sample expansion catches bad schemes and unparseable hosts up front
        let sample = expand(&base_url, &Node::root());
        let locator = TileLocator::parse(&sample)
            .map_err(|e| FetcherError::InvalidTemplate(e.to_string()))?;
        let extension = template_extension(locator.url().path());

        Ok(Self {
            base_url,
            min_zoom,
            max_zoom,
            timeout: None,
            cache_dir: None,
            headers: Vec::new(),
            extension,
        })
    }

    /// Timeout for each tile request.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, FetcherError> {
        if timeout.is_zero() {
            return Err(FetcherError::InvalidTimeout);
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Directory that cached tiles are read from and written to.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Adds a header sent with every tile request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn min_zoom(&self) -> u32 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> u32 {
        self.max_zoom
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cache_dir(&self) -> Option<&std::path::Path> {
        self.cache_dir.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns whether this source serves `node`'s level.
    pub fn serves(&self, node: &Node) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&node.level) && node.is_valid()
    }

    /// Expands the template for `node`.
    pub fn locator(&self, node: &Node) -> Result<TileLocator, FetcherError> {
        if !(self.min_zoom..=self.max_zoom).contains(&node.level) {
            return Err(FetcherError::ZoomOutOfRange {
                level: node.level,
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if !node.is_valid() {
            return Err(FetcherError::InvalidLocator {
                locator: node.to_string(),
                reason: "tile index outside its level".to_string(),
            });
        }

        let mut locator = TileLocator::parse(&expand(&self.base_url, node))?
            .with_headers(self.headers.iter().cloned());
        if let Some(timeout) = self.timeout {
            locator = locator.with_timeout(timeout)?;
        }
        Ok(locator)
    }

    /// Cache file for `node`, if this source has a cache directory.
    pub fn cache_file(&self, node: &Node) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let mut name = format!("{}_{}_{}", node.level, node.x, node.y);
        if let Some(ext) = &self.extension {
            name.push('.');
            name.push_str(ext);
        }
        Some(dir.join(name))
    }

    /// Builds the request for `node` at the given priority.
    pub fn fetch_request(&self, node: &Node, priority: f64) -> Result<FetchRequest, FetcherError> {
        let mut request = FetchRequest::new(self.locator(node)?).with_priority(priority);
        if let Some(path) = self.cache_file(node) {
            request = request.with_cache_file(path);
        }
        Ok(request)
    }

    /// Same as [`fetch_request`](Self::fetch_request) with caller data attached.
    pub fn fetch_request_with_context(
        &self,
        node: &Node,
        priority: f64,
        context: FetchContext,
    ) -> Result<FetchRequest, FetcherError> {
        Ok(self.fetch_request(node, priority)?.with_context(context))
    }
}

fn expand(template: &str, node: &Node) -> String {
    template
        .replace("{x}", &node.x.to_string())
        .replace("{y}", &node.y.to_string())
        .replace("{z}", &node.level.to_string())
}

fn template_extension(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_string())
}
