//! Point-in-time fetcher statistics.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Cumulative counters describing fetcher activity.
///
/// A snapshot is a plain value: once returned by a fetcher it has no link
/// back to it, and changing it never touches the live counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetcherStats {
    /// Start of stats collection
    pub start_date: DateTime<Utc>,
    /// Requests submitted, served remotely or from cache
    pub total_requests: u64,
    /// Requests that went out to the network
    pub remote_requests: u64,
    /// Requests cancelled, queued or in flight
    pub total_cancels: u64,
    /// Remote requests that failed
    pub total_fails: u64,
    /// Bytes received from successful remote requests
    pub remote_data: u64,
    /// Bytes read from the disk cache
    pub local_data: u64,
    /// Time spent on successful remote requests
    #[serde(serialize_with = "serialize_secs")]
    pub total_latency: Duration,
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

impl FetcherStats {
    /// Empty counters starting at `start_date`.
    pub fn new(start_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            total_requests: 0,
            remote_requests: 0,
            total_cancels: 0,
            total_fails: 0,
            remote_data: 0,
            local_data: 0,
            total_latency: Duration::ZERO,
        }
    }

    /// Adds `other`'s counters to ours.
    ///
    /// The combined start date is the earlier of the two.
    pub fn add_stats(&mut self, other: &FetcherStats) {
        self.start_date = self.start_date.min(other.start_date);
        self.total_requests += other.total_requests;
        self.remote_requests += other.remote_requests;
        self.total_cancels += other.total_cancels;
        self.total_fails += other.total_fails;
        self.remote_data += other.remote_data;
        self.local_data += other.local_data;
        self.total_latency += other.total_latency;
    }

    /// Logs the snapshot at info level.
    pub fn dump(&self, name: &str) {
        tracing::info!(fetcher = name, stats = %self, "Fetcher stats");
    }

    /// JSON rendering in the report shape.
    pub fn to_json(&self) -> String {
        // Serializing plain numbers and a timestamp cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Default for FetcherStats {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl fmt::Display for FetcherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = (Utc::now() - self.start_date).num_milliseconds().max(0) as f64 / 1000.0;
        write!(
            f,
            "{:.1}s: {} requests ({} remote, {} cancelled, {} failed), ",
            elapsed,
            self.total_requests,
            self.remote_requests,
            self.total_cancels,
            self.total_fails,
        )?;
        write!(
            f,
            "{} bytes remote, {} bytes local, {:.3}s latency",
            self.remote_data,
            self.local_data,
            self.total_latency.as_secs_f64()
        )
    }
}
