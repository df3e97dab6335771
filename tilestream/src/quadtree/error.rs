//! Quadtree error types.

use thiserror::Error;

use super::node::Node;

/// Errors raised by quadtree construction and node lookups.
///
/// All of these indicate a caller bug (bad bounds or a node that cannot
/// exist in this tree), not a transient runtime failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuadTreeError {
    /// Minimum level is above the maximum level.
    #[error("invalid level bounds: min level {min} > max level {max}")]
    InvalidLevels { min: u32, max: u32 },

    /// Requested level cannot be addressed with `u32` cell indices.
    #[error("level {level} exceeds the deepest supported level {max}")]
    LevelTooDeep { level: u32, max: u32 },

    /// The bounding rectangle is degenerate or non-finite.
    #[error("invalid bounding rectangle: {0}")]
    InvalidMbr(String),

    /// A node outside the tree's levels or grid.
    #[error("invalid node {node}: {reason}")]
    InvalidNode { node: Node, reason: String },
}
