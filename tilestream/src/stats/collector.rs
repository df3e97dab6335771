//! Running tallies behind [`FetcherStats`] snapshots.

use std::time::Duration;

use chrono::Utc;

use super::FetcherStats;

/// Keeps an all-time tally and a since-last-reset tally side by side.
///
/// Not synchronized on its own; the fetcher keeps it under the same lock as
/// its queues.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    all_time: FetcherStats,
    recent: FetcherStats,
}

impl StatsCollector {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            all_time: FetcherStats::new(now),
            recent: FetcherStats::new(now),
        }
    }

    /// A request entered the fetcher.
    pub fn request_submitted(&mut self) {
        self.apply(|s| s.total_requests += 1);
    }

    /// A request was answered from the disk cache.
    pub fn cache_hit(&mut self, bytes: u64) {
        self.apply(|s| s.local_data += bytes);
    }

    /// A request took a connection slot.
    pub fn remote_started(&mut self) {
        self.apply(|s| s.remote_requests += 1);
    }

    /// A remote request delivered data.
    pub fn remote_succeeded(&mut self, bytes: u64, latency: Duration) {
        self.apply(|s| {
            s.remote_data += bytes;
            s.total_latency += latency;
        });
    }

    /// A remote request failed.
    pub fn remote_failed(&mut self) {
        self.apply(|s| s.total_fails += 1);
    }

    /// A request was cancelled.
    pub fn cancelled(&mut self) {
        self.apply(|s| s.total_cancels += 1);
    }

    /// Copy of the all-time or the since-reset counters.
    pub fn snapshot(&self, all_time: bool) -> FetcherStats {
        if all_time {
            self.all_time.clone()
        } else {
            self.recent.clone()
        }
    }

    /// Restarts the since-reset counters. All-time counters are untouched.
    pub fn reset(&mut self) {
        self.recent = FetcherStats::new(Utc::now());
    }

    fn apply(&mut self, update: impl Fn(&mut FetcherStats)) {
        update(&mut self.all_time);
        update(&mut self.recent);
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
