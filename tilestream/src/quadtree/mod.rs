//! Spatial quadtree for tile selection.
//!
//! Given a root rectangle, a level range and an importance strategy, the
//! [`QuadTree`] decides which nodes of the tile pyramid are worth loading
//! within a node budget.
//!
//! # Example
//!
//! ```
//! use tilestream::quadtree::{Mbr, Node, QuadTree};
//!
//! let tree = QuadTree::new(Mbr::unit(), 0, 2, |node: &Node| {
//!     1.0 / (node.level as f64 + 1.0)
//! })
//! .unwrap();
//!
//! let coverage = tree.calc_coverage(0.2, 5);
//! assert_eq!(coverage.len(), 5);
//! assert!(coverage.iter().all(|n| n.node.level == 2));
//! ```

mod error;
mod mbr;
mod node;
mod tree;

pub use error::QuadTreeError;
pub use mbr::Mbr;
pub use node::{ImportantNode, Node, MAX_NODE_LEVEL};
pub use tree::{Importance, QuadTree};
