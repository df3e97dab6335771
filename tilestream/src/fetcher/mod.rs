//! Prioritized remote tile fetching with a disk cache.
//!
//! A [`RemoteTileFetcher`] takes [`FetchRequest`]s, serves them from their
//! cache file when one exists, and otherwise downloads them with at most
//! `num_connections` requests on the network at once. Queued requests are
//! started highest priority first; equal priorities go in submission order.
//!
//! # Example
//!
//! ```no_run
//! use tilestream::fetcher::{FetchRequest, RemoteTileFetcher, TileLocator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = RemoteTileFetcher::new("imagery", 8)?;
//!
//! let locator = TileLocator::parse("https://tiles.example.com/3/2/5.png")?;
//! let request = FetchRequest::new(locator)
//!     .with_priority(0.8)
//!     .with_cache_file("/tmp/tiles/3_2_5.png");
//!
//! let (_handle, outcome) = fetcher.fetch(request);
//! let outcome = outcome.await?;
//! println!("{} bytes", outcome.data().map_or(0, |d| d.len()));
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod error;
mod http;
mod queue;
mod remote;
mod request;

pub use cache::{read_cached, write_cached};
pub use config::{FetcherConfig, CONFIG_SECTION, DEFAULT_NUM_CONNECTIONS};
pub use error::{FetchError, FetcherError};
pub use http::{AsyncHttpClient, ReqwestClient, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use queue::FetchQueue;
pub use remote::{FetchState, RemoteTileFetcher};
pub use request::{
    FetchCallback, FetchContext, FetchHandle, FetchOutcome, FetchRequest, FetchSource,
    TileLocator,
};
