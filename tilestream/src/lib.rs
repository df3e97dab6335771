//! TileStream - tile selection and fetching for image pyramids
//!
//! This library decides which tiles of a quadtree pyramid are worth loading
//! and brings them in from remote servers with a bounded number of
//! connections and a per-tile disk cache.
//!
//! - [`quadtree`]: importance-driven coverage of a tile pyramid
//! - [`fetcher`]: prioritized, cancellable remote fetching
//! - [`tile_info`]: URL templates that map quadtree nodes to requests
//! - [`stats`]: fetcher activity counters
//! - [`logging`]: subscriber setup for applications
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilestream::fetcher::RemoteTileFetcher;
//! use tilestream::quadtree::{Mbr, Node, QuadTree};
//! use tilestream::tile_info::RemoteTileInfo;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let tree = QuadTree::new(Mbr::unit(), 0, 4, |node: &Node| {
//!     1.0 / (1u64 << node.level) as f64
//! })?;
//! let info = RemoteTileInfo::new("https://tiles.example.com/{z}/{x}/{y}.png", 0, 18)?
//!     .with_cache_dir("/tmp/tiles");
//! let fetcher = RemoteTileFetcher::new("imagery", 8)?;
//!
//! for tile in tree.calc_coverage(0.01, 64) {
//!     let request = info.fetch_request_with_context(
//!         &tile.node,
//!         tile.importance,
//!         Arc::new(tile.node),
//!     )?;
//!     fetcher.submit(request, |outcome| {
//!         if let Some(node) = outcome.context_as::<Node>() {
//!             println!("{}: success={}", node, outcome.is_success());
//!         }
//!     });
//! }
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod logging;
pub mod quadtree;
pub mod stats;
pub mod tile_info;
