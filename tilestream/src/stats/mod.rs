//! Fetcher activity statistics.
//!
//! # Architecture
//!
//! ```text
//! RemoteTileFetcher ─────► StatsCollector ─────► FetcherStats ─────► Reports
//!                          (all-time +          (independent copy)   (Display, JSON)
//!                           since-reset)
//! ```
//!
//! The collector lives inside the fetcher's lock, so every update is
//! applied to both tallies at once and no increment is lost.
//!
//! # Example
//!
//! ```
//! use tilestream::stats::StatsCollector;
//! use std::time::Duration;
//!
//! let mut collector = StatsCollector::new();
//! collector.request_submitted();
//! collector.remote_started();
//! collector.remote_succeeded(2048, Duration::from_millis(120));
//!
//! let snapshot = collector.snapshot(true);
//! assert_eq!(snapshot.remote_data, 2048);
//! ```

mod collector;
mod snapshot;

pub use collector::StatsCollector;
pub use snapshot::FetcherStats;
