//! End-to-end: quadtree coverage drives tile requests through the fetcher.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use tempfile::TempDir;
use tilestream::fetcher::{
    AsyncHttpClient, FetchError, FetchSource, FetcherConfig, RemoteTileFetcher, TileLocator,
};
use tilestream::quadtree::{Mbr, Node, QuadTree};
use tilestream::tile_info::RemoteTileInfo;

/// Serves the request path as the body, after a short delay.
#[derive(Default)]
struct EchoServer {
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl AsyncHttpClient for EchoServer {
    async fn get(&self, locator: &TileLocator) -> Result<Bytes, FetchError> {
        let path = locator.url().path().to_string();
        self.requests.lock().unwrap().push(path.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if path.ends_with("/0.png") && path.starts_with("/3/") {
            return Err(FetchError::Status {
                status: 503,
                url: locator.url().to_string(),
            });
        }
        Ok(Bytes::from(path))
    }
}

fn closeness(target: (f64, f64)) -> impl Fn(&Node) -> f64 + Send + Sync {
    let tree_mbr = Mbr::unit();
    move |node: &Node| {
        let n = (1u64 << node.level) as f64;
        let cx = tree_mbr.min_x() + (node.x as f64 + 0.5) / n;
        let cy = tree_mbr.min_y() + (node.y as f64 + 0.5) / n;
        let dist = ((cx - target.0).powi(2) + (cy - target.1).powi(2)).sqrt();
        // Finer tiles near the target matter more
        (1.0 - dist).max(0.0) * (node.level as f64 + 1.0)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_coverage_fetched_then_served_from_cache() {
    let cache = TempDir::new().unwrap();
    let tree = QuadTree::new(Mbr::unit(), 1, 3, closeness((0.3, 0.7))).unwrap();
    let coverage = tree.calc_coverage(0.1, 24);
    assert!(!coverage.is_empty());
    assert!(coverage.len() <= 24);

    let info = RemoteTileInfo::new("http://tiles.test/{z}/{x}/{y}.png", 0, 3)
        .unwrap()
        .with_cache_dir(cache.path());
    let server = Arc::new(EchoServer::default());
    let fetcher =
        RemoteTileFetcher::with_client(FetcherConfig::new("e2e", 4), Arc::clone(&server)).unwrap();

    let mut receivers = Vec::new();
    for tile in &coverage {
        let request = info
            .fetch_request_with_context(&tile.node, tile.importance, Arc::new(tile.node))
            .unwrap();
        receivers.push(fetcher.fetch(request).1);
    }
    let outcomes: Vec<_> = join_all(receivers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let mut failed = 0;
    for outcome in &outcomes {
        let node = *outcome.context_as::<Node>().unwrap();
        match &outcome.result {
            Ok((data, source)) => {
                assert_eq!(*source, FetchSource::Network);
                let expected = format!("/{}/{}/{}.png", node.level, node.x, node.y);
                assert_eq!(data, &Bytes::from(expected.clone()));
                let cached = std::fs::read(info.cache_file(&node).unwrap()).unwrap();
                assert_eq!(cached, expected.as_bytes());
            }
            Err(FetchError::Status { status: 503, .. }) => {
                failed += 1;
                assert!(!info.cache_file(&node).unwrap().exists());
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert!(server.peak.load(Ordering::SeqCst) <= 4);
    let unique: HashSet<_> = server.requests.lock().unwrap().iter().cloned().collect();
    assert_eq!(unique.len(), coverage.len());

    let stats = fetcher.get_stats(true);
    assert_eq!(stats.total_requests, coverage.len() as u64);
    assert_eq!(stats.remote_requests, coverage.len() as u64);
    assert_eq!(stats.total_fails, failed);
    assert_eq!(stats.local_data, 0);

    // Second pass: every successful tile now comes from disk
    fetcher.reset_stats();
    let before = server.requests.lock().unwrap().len();
    let mut receivers = Vec::new();
    for tile in &coverage {
        let request = info.fetch_request(&tile.node, tile.importance).unwrap();
        receivers.push(fetcher.fetch(request).1);
    }
    let outcomes: Vec<_> = join_all(receivers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let from_cache = outcomes
        .iter()
        .filter(|o| matches!(o.result, Ok((_, FetchSource::Cache))))
        .count() as u64;
    assert_eq!(from_cache, coverage.len() as u64 - failed);

    let recent = fetcher.get_stats(false);
    assert_eq!(recent.total_requests, coverage.len() as u64);
    assert_eq!(recent.remote_requests, failed);
    assert!(recent.local_data > 0);
    assert_eq!(server.requests.lock().unwrap().len() - before, failed as usize);

    let report = recent.to_json();
    assert!(report.contains("\"totalRequests\""));
}

#[tokio::test]
async fn test_cancelled_coverage_never_completes() {
    let tree = QuadTree::new(Mbr::unit(), 2, 2, |_: &Node| 1.0).unwrap();
    let coverage = tree.calc_coverage(0.0, 16);
    assert_eq!(coverage.len(), 16);

    let info = RemoteTileInfo::new("http://tiles.test/{z}/{x}/{y}.png", 0, 5).unwrap();
    let server = Arc::new(EchoServer::default());
    let config = FetcherConfig::new("cancel", 1);
    let fetcher = RemoteTileFetcher::with_client(config, Arc::clone(&server)).unwrap();

    let completed = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = coverage
        .iter()
        .map(|tile| {
            let counter = Arc::clone(&completed);
            fetcher.submit(info.fetch_request(&tile.node, 1.0).unwrap(), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    // Nothing has been dispatched yet; keep only the first request
    let cancelled = handles[1..].iter().filter(|h| fetcher.cancel(**h)).count();
    assert_eq!(cancelled, 15);

    tokio::time::timeout(Duration::from_secs(5), async {
        while completed.load(Ordering::SeqCst) == 0 || fetcher.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(server.requests.lock().unwrap().len(), 1);
    assert_eq!(fetcher.get_stats(true).total_cancels, 15);
}
