//! Remote tile fetcher.
//!
//! The [`RemoteTileFetcher`] accepts fetch requests, answers them from the
//! disk cache when it can, and otherwise runs them on a bounded number of
//! network connections in priority order.
//!
//! # Request lifecycle
//!
//! ```text
//!                  ┌──────────────► CacheCompleted
//!                  │ cache hit
//!  submit ──► Queued ──────────────► CancelledRemoved
//!                  │ slot free      cancel
//!                  ▼
//!               Active ──┬─────────► Completed
//!                        ├─────────► Failed
//!                        └─────────► CancelledDiscard
//!                          cancel, then network returns
//! ```
//!
//! Every queue, active-set and stats mutation happens under one lock per
//! fetcher. Callbacks and cache writes run after the lock is released.
//!
//! Submitting only enqueues. Slots are filled by a dispatch pass that runs
//! on the runtime after the submitting code yields, so requests submitted
//! back to back start in priority order rather than arrival order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::cache::{read_cached, write_cached};
use super::config::FetcherConfig;
use super::error::{FetchError, FetcherError};
use super::http::{AsyncHttpClient, ReqwestClient};
use super::queue::FetchQueue;
use super::request::{
    FetchCallback, FetchContext, FetchHandle, FetchOutcome, FetchRequest, FetchSource,
    TileLocator,
};
use crate::stats::{FetcherStats, StatsCollector};

/// Lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchState {
    /// Waiting for a connection slot.
    Queued,
    /// Answered from the disk cache.
    CacheCompleted,
    /// Running on a connection.
    Active,
    /// Remote fetch delivered data.
    Completed,
    /// Remote fetch failed.
    Failed,
    /// Cancelled while active; the network result was thrown away.
    CancelledDiscard,
    /// Cancelled while still queued.
    CancelledRemoved,
}

impl FetchState {
    /// Returns true if no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FetchState::Queued | FetchState::Active)
    }
}

struct Pending {
    request: FetchRequest,
    callback: FetchCallback,
}

struct ActiveFetch {
    cache_file: Option<PathBuf>,
    context: Option<FetchContext>,
    callback: Option<FetchCallback>,
    token: CancellationToken,
    cancelled: bool,
    started: Instant,
}

/// A request that has just been given a connection slot.
struct Dispatch {
    handle: FetchHandle,
    locator: TileLocator,
    token: CancellationToken,
}

/// A finished remote request, decided under the lock.
struct Completion {
    state: FetchState,
    cache_file: Option<PathBuf>,
    context: Option<FetchContext>,
    callback: Option<FetchCallback>,
}

struct FetcherState {
    queue: FetchQueue<Pending>,
    active: HashMap<FetchHandle, ActiveFetch>,
    stats: StatsCollector,
    num_connections: usize,
    next_handle: u64,
    dispatch_scheduled: bool,
}

impl FetcherState {
    fn allocate_handle(&mut self) -> FetchHandle {
        let handle = FetchHandle::new(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Moves queued work into free slots, highest priority first.
    fn take_dispatchable(&mut self) -> Vec<Dispatch> {
        let mut jobs = Vec::new();
        while self.active.len() < self.num_connections {
            let Some((handle, pending)) = self.queue.pop() else {
                break;
            };
            let (locator, cache_file, context) = pending.request.into_parts();
            let token = CancellationToken::new();
            self.stats.remote_started();
            self.active.insert(
                handle,
                ActiveFetch {
                    cache_file,
                    context,
                    callback: Some(pending.callback),
                    token: token.clone(),
                    cancelled: false,
                    started: Instant::now(),
                },
            );
            jobs.push(Dispatch {
                handle,
                locator,
                token,
            });
        }
        jobs
    }
}

struct Inner<C> {
    name: String,
    client: Arc<C>,
    runtime: Handle,
    debug_mode: AtomicBool,
    state: Mutex<FetcherState>,
}

/// Fetches tiles from remote URLs with bounded concurrency.
///
/// Cloning is cheap and yields another handle to the same fetcher.
pub struct RemoteTileFetcher<C: AsyncHttpClient = ReqwestClient> {
    inner: Arc<Inner<C>>,
}

impl<C: AsyncHttpClient> Clone for RemoteTileFetcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RemoteTileFetcher<ReqwestClient> {
    /// Creates a fetcher with `num_connections` parallel network slots.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(name: impl Into<String>, num_connections: usize) -> Result<Self, FetcherError> {
        Self::with_config(FetcherConfig::new(name, num_connections))
    }

    /// Creates a fetcher backed by reqwest from a full configuration.
    pub fn with_config(config: FetcherConfig) -> Result<Self, FetcherError> {
        config.validate()?;
        let client = ReqwestClient::with_options(config.default_timeout, &config.user_agent)?;
        Self::with_client(config, Arc::new(client))
    }
}

impl<C: AsyncHttpClient> RemoteTileFetcher<C> {
    /// Creates a fetcher using a caller-supplied HTTP client.
    pub fn with_client(config: FetcherConfig, client: Arc<C>) -> Result<Self, FetcherError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| FetcherError::NoRuntime(e.to_string()))?;

        info!(
            fetcher = %config.name,
            connections = config.num_connections,
            debug = config.debug_mode,
            "Created remote tile fetcher"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name: config.name,
                client,
                runtime,
                debug_mode: AtomicBool::new(config.debug_mode),
                state: Mutex::new(FetcherState {
                    queue: FetchQueue::new(),
                    active: HashMap::new(),
                    stats: StatsCollector::new(),
                    num_connections: config.num_connections,
                    next_handle: 1,
                    dispatch_scheduled: false,
                }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Submits one request.
    ///
    /// A cache hit calls `callback` before this returns. Otherwise the
    /// request is queued and `callback` runs later on a runtime thread.
    pub fn submit<F>(&self, request: FetchRequest, callback: F) -> FetchHandle
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        let handles = self.submit_batch(vec![(request, Box::new(callback) as FetchCallback)]);
        handles[0]
    }

    /// Submits several requests at once.
    ///
    /// All of them are queued before any is dispatched, so the batch is
    /// started in priority order even when connections are idle. Queued
    /// requests become active once the caller yields to the runtime.
    pub fn submit_batch(&self, requests: Vec<(FetchRequest, FetchCallback)>) -> Vec<FetchHandle> {
        // Cache reads happen before any network work and outside the lock
        let prepared: Vec<(FetchRequest, FetchCallback, Option<Bytes>)> = requests
            .into_iter()
            .map(|(request, callback)| {
                let cached = request.cache_file().and_then(read_cached);
                (request, callback, cached)
            })
            .collect();

        let mut handles = Vec::with_capacity(prepared.len());
        let mut hits = Vec::new();
        let mut queued = Vec::new();
        let schedule = {
            let mut state = self.inner.state.lock();
            for (request, callback, cached) in prepared {
                let handle = state.allocate_handle();
                handles.push(handle);
                state.stats.request_submitted();
                match cached {
                    Some(data) => {
                        state.stats.cache_hit(data.len() as u64);
                        hits.push((handle, request, callback, data));
                    }
                    None => {
                        queued.push((handle, request.locator().url().to_string()));
                        let priority = request.priority();
                        state.queue.push(handle, priority, Pending { request, callback });
                    }
                }
            }
            let schedule = !queued.is_empty() && !state.dispatch_scheduled;
            if schedule {
                state.dispatch_scheduled = true;
            }
            schedule
        };

        for (handle, url) in &queued {
            self.inner.log_transition(*handle, FetchState::Queued, url);
        }
        for (handle, request, callback, data) in hits {
            let url = request.locator().url().as_str();
            self.inner.log_transition(handle, FetchState::CacheCompleted, url);
            let (_, _, context) = request.into_parts();
            callback(FetchOutcome {
                handle,
                context,
                result: Ok((data, FetchSource::Cache)),
            });
        }
        if schedule {
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(async move { inner.dispatch() });
        }

        handles
    }

    /// Submits a request and returns a receiver for its outcome.
    ///
    /// If the request is cancelled the sender is dropped, so the receiver
    /// resolves to an error instead of data.
    pub fn fetch(&self, request: FetchRequest) -> (FetchHandle, oneshot::Receiver<FetchOutcome>) {
        let (tx, rx) = oneshot::channel();
        let handle = self.submit(request, move |outcome| {
            let _ = tx.send(outcome);
        });
        (handle, rx)
    }

    /// Cancels a request.
    ///
    /// A queued request is removed. An active one is marked so that its
    /// result is discarded when the network operation returns. Either way
    /// the callback is dropped without being called. Returns false if the
    /// request was already finished, already cancelled or unknown.
    pub fn cancel(&self, handle: FetchHandle) -> bool {
        let mut state = self.inner.state.lock();

        if let Some(pending) = state.queue.remove(handle) {
            state.stats.cancelled();
            drop(state);
            self.inner.log_transition(
                handle,
                FetchState::CancelledRemoved,
                pending.request.locator().url().as_str(),
            );
            return true;
        }

        let dropped_callback = match state.active.get_mut(&handle) {
            Some(active) if !active.cancelled => {
                active.cancelled = true;
                active.token.cancel();
                active.callback.take()
            }
            _ => return false,
        };
        state.stats.cancelled();
        drop(state);
        drop(dropped_callback);

        if self.inner.debug_enabled() {
            debug!(fetcher = %self.inner.name, %handle, "Cancelled active fetch");
        }
        true
    }

    /// Cancels everything queued or active. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let drained = state.queue.drain();
        let mut callbacks = Vec::new();
        for active in state.active.values_mut().filter(|a| !a.cancelled) {
            active.cancelled = true;
            active.token.cancel();
            callbacks.push(active.callback.take());
        }
        let count = drained.len() + callbacks.len();
        for _ in 0..count {
            state.stats.cancelled();
        }
        drop(state);

        for (handle, pending) in &drained {
            self.inner.log_transition(
                *handle,
                FetchState::CancelledRemoved,
                pending.request.locator().url().as_str(),
            );
        }
        drop(drained);
        drop(callbacks);

        if count > 0 {
            debug!(fetcher = %self.inner.name, count, "Cancelled all fetches");
        }
        count
    }

    /// Raises the priority of a queued request, or lowers it.
    ///
    /// Returns false if the request is no longer queued.
    pub fn update_priority(&self, handle: FetchHandle, priority: f64) -> bool {
        let priority = if priority.is_nan() { 0.0 } else { priority };
        self.inner.state.lock().queue.reprioritize(handle, priority)
    }

    /// Queued or active, or `None` once the request has finished.
    ///
    /// A cancelled active request reports `Active` until its network
    /// operation returns, since it still holds a connection slot.
    pub fn status(&self, handle: FetchHandle) -> Option<FetchState> {
        let state = self.inner.state.lock();
        if state.queue.contains(handle) {
            Some(FetchState::Queued)
        } else if state.active.contains_key(&handle) {
            Some(FetchState::Active)
        } else {
            None
        }
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn num_connections(&self) -> usize {
        self.inner.state.lock().num_connections
    }

    /// Changes the number of connection slots.
    ///
    /// Growing dispatches queued work right away; shrinking lets active
    /// requests finish before the lower limit takes effect.
    pub fn set_num_connections(&self, num_connections: usize) -> Result<(), FetcherError> {
        if num_connections == 0 {
            return Err(FetcherError::InvalidConnections);
        }
        let jobs = {
            let mut state = self.inner.state.lock();
            state.num_connections = num_connections;
            state.take_dispatchable()
        };
        debug!(
            fetcher = %self.inner.name,
            connections = num_connections,
            "Changed connection count"
        );
        self.inner.spawn_all(jobs);
        Ok(())
    }

    /// Stats since creation (`all_time`) or since the last reset.
    pub fn get_stats(&self, all_time: bool) -> FetcherStats {
        self.inner.state.lock().stats.snapshot(all_time)
    }

    /// Restarts the since-reset stats. All-time stats are kept.
    pub fn reset_stats(&self) {
        self.inner.state.lock().stats.reset();
    }

    pub fn debug_mode(&self) -> bool {
        self.inner.debug_enabled()
    }

    /// Turns per-transition diagnostics on or off for this fetcher only.
    pub fn set_debug_mode(&self, debug_mode: bool) {
        self.inner.debug_mode.store(debug_mode, Ordering::Relaxed);
    }
}

impl<C: AsyncHttpClient> Inner<C> {
    fn debug_enabled(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    fn log_transition(&self, handle: FetchHandle, state: FetchState, url: &str) {
        if self.debug_enabled() {
            debug!(fetcher = %self.name, %handle, ?state, url, "Fetch state changed");
        } else {
            trace!(fetcher = %self.name, %handle, ?state, url, "Fetch state changed");
        }
    }

    /// Fills free slots from the queue.
    fn dispatch(self: &Arc<Self>) {
        let jobs = {
            let mut state = self.state.lock();
            state.dispatch_scheduled = false;
            state.take_dispatchable()
        };
        self.spawn_all(jobs);
    }

    fn spawn_all(self: &Arc<Self>, jobs: Vec<Dispatch>) {
        for job in jobs {
            self.log_transition(job.handle, FetchState::Active, job.locator.url().as_str());
            let inner = Arc::clone(self);
            self.runtime.spawn(async move { inner.run(job).await });
        }
    }

    async fn run(self: Arc<Self>, job: Dispatch) {
        // A result that is already in hand wins over a cancel; complete()
        // still discards it if the cancel was recorded first.
        let result = tokio::select! {
            biased;
            result = self.client.get(&job.locator) => Some(result),
            _ = job.token.cancelled() => None,
        };

        let Some((completion, next)) = self.complete(job.handle, &result) else {
            return;
        };
        self.spawn_all(next);
        self.log_transition(job.handle, completion.state, job.locator.url().as_str());

        let Completion {
            state,
            cache_file,
            context,
            callback,
        } = completion;
        let Some(callback) = callback else {
            return;
        };

        let outcome = match (state, result) {
            (FetchState::Completed, Some(Ok(data))) => {
                if let Some(path) = &cache_file {
                    write_cached(path, &data).await;
                }
                Ok((data, FetchSource::Network))
            }
            (_, Some(Err(e))) => Err(e),
            // Only cancelled fetches are discarded, and those have no callback
            _ => return,
        };

        callback(FetchOutcome {
            handle: job.handle,
            context,
            result: outcome,
        });
    }

    /// Records the end of an active request and refills its slot.
    fn complete(
        &self,
        handle: FetchHandle,
        result: &Option<Result<Bytes, FetchError>>,
    ) -> Option<(Completion, Vec<Dispatch>)> {
        let mut state = self.state.lock();
        let active = state.active.remove(&handle)?;

        let fetch_state = match result {
            _ if active.cancelled => FetchState::CancelledDiscard,
            Some(Ok(data)) => {
                state
                    .stats
                    .remote_succeeded(data.len() as u64, active.started.elapsed());
                FetchState::Completed
            }
            Some(Err(_)) => {
                state.stats.remote_failed();
                FetchState::Failed
            }
            None => FetchState::CancelledDiscard,
        };
        let next = state.take_dispatchable();

        let callback = if fetch_state == FetchState::CancelledDiscard {
            None
        } else {
            active.callback
        };

        Some((
            Completion {
                state: fetch_state,
                cache_file: active.cache_file,
                context: active.context,
                callback,
            },
            next,
        ))
    }
}

impl<C: AsyncHttpClient> std::fmt::Debug for RemoteTileFetcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RemoteTileFetcher")
            .field("name", &self.inner.name)
            .field("num_connections", &state.num_connections)
            .field("active", &state.active.len())
            .field("queued", &state.queue.len())
            .finish()
    }
}
