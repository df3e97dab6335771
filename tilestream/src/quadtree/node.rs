//! Quadtree node identifiers.

use std::cmp::Ordering;
use std::fmt;

/// Deepest level a node may have.
///
/// Cell indices are `u32`, so a level must keep `2^level` addressable.
pub const MAX_NODE_LEVEL: u32 = 31;

/// A single cell of the tile pyramid.
///
/// `level` is the depth from the root (0 = coarsest). At a given level the
/// valid `x` and `y` lie in `[0, 2^level)`.
///
/// Ordering is lexicographic on `(level, x, y)`, which is the field order
/// below; keep it that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    /// Level of detail, 0 at the top
    pub level: u32,
    /// Column within the level
    pub x: u32,
    /// Row within the level
    pub y: u32,
}

impl Node {
    /// Creates a node from its cell coordinates and level.
    pub fn new(x: u32, y: u32, level: u32) -> Self {
        Self { level, x, y }
    }

    /// The root node.
    pub fn root() -> Self {
        Self::new(0, 0, 0)
    }

    /// Number of cells along one axis at this node's level.
    #[inline]
    pub fn grid_size(&self) -> u64 {
        1u64 << self.level
    }

    /// Returns true if `x` and `y` are addressable at this node's level.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.level <= MAX_NODE_LEVEL
            && u64::from(self.x) < self.grid_size()
            && u64::from(self.y) < self.grid_size()
    }

    /// The four children, in `(x, y)` order: (0,0), (1,0), (0,1), (1,1).
    pub fn children(&self) -> [Node; 4] {
        let (x, y, level) = (self.x * 2, self.y * 2, self.level + 1);
        [
            Node::new(x, y, level),
            Node::new(x + 1, y, level),
            Node::new(x, y + 1, level),
            Node::new(x + 1, y + 1, level),
        ]
    }

    /// The parent node, or `None` for the root.
    pub fn parent(&self) -> Option<Node> {
        if self.level == 0 {
            None
        } else {
            Some(Node::new(self.x / 2, self.y / 2, self.level - 1))
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}

/// A node paired with how urgently it is needed.
///
/// Sorted sets of these yield the most important node first: ordering is by
/// importance descending, then by the node's `(level, x, y)` ascending.
#[derive(Debug, Clone, Copy)]
pub struct ImportantNode {
    pub node: Node,
    pub importance: f64,
}

impl ImportantNode {
    pub fn new(node: Node, importance: f64) -> Self {
        Self { node, importance }
    }
}

impl PartialEq for ImportantNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ImportantNode {}

impl PartialOrd for ImportantNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImportantNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse on importance so that iteration starts at the highest
        match other.importance.total_cmp(&self.importance) {
            Ordering::Equal => self.node.cmp(&other.node),
            ordering => ordering,
        }
    }
}
