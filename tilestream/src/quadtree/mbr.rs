//! Axis-aligned bounding rectangles in tree space.

use std::fmt;

use super::error::QuadTreeError;
use super::node::Node;

/// Minimum bounding rectangle.
///
/// Always non-degenerate: construction rejects non-finite corners and
/// rectangles with zero or negative extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mbr {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Mbr {
    /// Creates a rectangle from its lower-left and upper-right corners.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, QuadTreeError> {
        if ![min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite()) {
            return Err(QuadTreeError::InvalidMbr(format!(
                "non-finite corner in ({}, {}) - ({}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        if max_x <= min_x || max_y <= min_y {
            return Err(QuadTreeError::InvalidMbr(format!(
                "degenerate extent ({}, {}) - ({}, {})",
                min_x, min_y, max_x, max_y
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// The unit square `(0, 0) - (1, 1)`.
    pub fn unit() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 1.0,
            max_y: 1.0,
        }
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// The cell `(node.x, node.y)` of a `2^level x 2^level` grid laid over
    /// this rectangle.
    ///
    /// Grid lines are computed the same way for every level, so a parent's
    /// edges coincide exactly with its children's outer edges and the last
    /// row/column ends exactly on this rectangle's maximum.
    ///
    /// The node is not range-checked here; see
    /// [`QuadTree::generate_mbr_for_node`](super::QuadTree::generate_mbr_for_node).
    pub fn cell(&self, node: &Node) -> Mbr {
        let n = node.grid_size();
        let x = u64::from(node.x);
        let y = u64::from(node.y);
        Mbr {
            min_x: grid_line(self.min_x, self.max_x, x, n),
            min_y: grid_line(self.min_y, self.max_y, y, n),
            max_x: grid_line(self.min_x, self.max_x, x + 1, n),
            max_y: grid_line(self.min_y, self.max_y, y + 1, n),
        }
    }
}

/// Position of grid line `i` out of `n` between `min` and `max`.
#[inline]
fn grid_line(min: f64, max: f64, i: u64, n: u64) -> f64 {
    if i >= n {
        max
    } else {
        min + (max - min) * (i as f64) / (n as f64)
    }
}

impl fmt::Display for Mbr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}
