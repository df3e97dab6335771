//! Coverage calculation over an unbounded quadtree.
//!
//! The tree keeps no per-call state. Each [`QuadTree::calc_coverage`] call
//! walks the tree from `min_level` down, asking the [`Importance`] strategy
//! how much each node matters, and returns the leaves worth loading.

use std::collections::BTreeSet;

use tracing::trace;

use super::error::QuadTreeError;
use super::mbr::Mbr;
use super::node::{ImportantNode, Node, MAX_NODE_LEVEL};

/// View-dependent importance of a node.
///
/// Implementations must be pure from the tree's point of view: the same node
/// evaluated twice during one coverage pass must score the same. Values are
/// expected to be non-negative; higher means more urgently needed.
pub trait Importance: Send + Sync {
    fn importance(&self, node: &Node) -> f64;
}

impl<F> Importance for F
where
    F: Fn(&Node) -> f64 + Send + Sync,
{
    fn importance(&self, node: &Node) -> f64 {
        self(node)
    }
}

/// Spatial quadtree used to decide which tiles to load.
pub struct QuadTree<I> {
    mbr: Mbr,
    min_level: u32,
    max_level: u32,
    importance: I,
}

impl<I: Importance> QuadTree<I> {
    /// Creates a tree over `mbr` spanning levels `min_level..=max_level`.
    pub fn new(
        mbr: Mbr,
        min_level: u32,
        max_level: u32,
        importance: I,
    ) -> Result<Self, QuadTreeError> {
        if min_level > max_level {
            return Err(QuadTreeError::InvalidLevels {
                min: min_level,
                max: max_level,
            });
        }
        if max_level > MAX_NODE_LEVEL {
            return Err(QuadTreeError::LevelTooDeep {
                level: max_level,
                max: MAX_NODE_LEVEL,
            });
        }
        Ok(Self {
            mbr,
            min_level,
            max_level,
            importance,
        })
    }

    pub fn mbr(&self) -> &Mbr {
        &self.mbr
    }

    pub fn min_level(&self) -> u32 {
        self.min_level
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    pub fn importance_fn(&self) -> &I {
        &self.importance
    }

    /// Computes the set of nodes to load.
    ///
    /// Starting from every node at `min_level`, a node scoring below
    /// `min_importance` is dropped along with its whole subtree. A node that
    /// passes is replaced by its four children until `max_level`, where it
    /// becomes part of the result. If more than `max_nodes` survive, the
    /// least important are trimmed (ties go to the larger `(level, x, y)`).
    pub fn calc_coverage(&self, min_importance: f64, max_nodes: usize) -> BTreeSet<ImportantNode> {
        let mut result = BTreeSet::new();
        let mut stack = self.start_nodes();
        let mut visited = 0usize;
        let mut candidates = 0usize;

        while let Some(node) = stack.pop() {
            visited += 1;
            let importance = self.importance.importance(&node);
            if importance < min_importance || importance.is_nan() {
                continue;
            }
            if node.level < self.max_level {
                stack.extend(node.children());
            } else {
                candidates += 1;
                result.insert(ImportantNode::new(node, importance));
                // Never hold more than the budget
                if result.len() > max_nodes {
                    result.pop_last();
                }
            }
        }

        trace!(
            visited,
            candidates,
            selected = result.len(),
            min_importance,
            max_nodes,
            "Calculated quadtree coverage"
        );

        result
    }

    /// Bounding rectangle of a node.
    ///
    /// Fails for nodes outside `min_level..=max_level` or outside their
    /// level's grid.
    pub fn generate_mbr_for_node(&self, node: &Node) -> Result<Mbr, QuadTreeError> {
        self.check_node(node)?;
        Ok(self.mbr.cell(node))
    }

    fn check_node(&self, node: &Node) -> Result<(), QuadTreeError> {
        if node.level < self.min_level || node.level > self.max_level {
            return Err(QuadTreeError::InvalidNode {
                node: *node,
                reason: format!(
                    "level outside {}..={}",
                    self.min_level, self.max_level
                ),
            });
        }
        if !node.is_valid() {
            return Err(QuadTreeError::InvalidNode {
                node: *node,
                reason: format!("cell outside the {0}x{0} grid", node.grid_size()),
            });
        }
        Ok(())
    }

    // Pushed in reverse so that the stack pops them in (x, y) order.
    fn start_nodes(&self) -> Vec<Node> {
        let n = 1u32 << self.min_level;
        let mut nodes = Vec::with_capacity((n as usize) * (n as usize));
        for y in (0..n).rev() {
            for x in (0..n).rev() {
                nodes.push(Node::new(x, y, self.min_level));
            }
        }
        nodes
    }
}

impl<I> std::fmt::Debug for QuadTree<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadTree")
            .field("mbr", &self.mbr)
            .field("min_level", &self.min_level)
            .field("max_level", &self.max_level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn by_level(node: &Node) -> f64 {
        1.0 / (node.level as f64 + 1.0)
    }

    #[test]
    fn test_rejects_inverted_levels() {
        let result = QuadTree::new(Mbr::unit(), 3, 2, by_level);
        assert!(matches!(
            result.unwrap_err(),
            QuadTreeError::InvalidLevels { min: 3, max: 2 }
        ));
    }

    #[test]
    fn test_rejects_too_deep() {
        let result = QuadTree::new(Mbr::unit(), 0, MAX_NODE_LEVEL + 1, by_level);
        assert!(matches!(
            result.unwrap_err(),
            QuadTreeError::LevelTooDeep { .. }
        ));
    }

    #[test]
    fn test_trim_keeps_smallest_nodes_on_ties() {
        let tree = QuadTree::new(Mbr::unit(), 0, 2, by_level).unwrap();
        let coverage = tree.calc_coverage(0.2, 5);

        let nodes: Vec<Node> = coverage.iter().map(|n| n.node).collect();
        assert_eq!(
            nodes,
            vec![
                Node::new(0, 0, 2),
                Node::new(0, 1, 2),
                Node::new(0, 2, 2),
                Node::new(0, 3, 2),
                Node::new(1, 0, 2),
            ]
        );
        for n in &coverage {
            assert!((n.importance - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_full_expansion_without_budget_pressure() {
        let tree = QuadTree::new(Mbr::unit(), 0, 2, by_level).unwrap();
        let coverage = tree.calc_coverage(0.2, 100);
        assert_eq!(coverage.len(), 16);
        assert!(coverage.iter().all(|n| n.node.level == 2));
    }

    #[test]
    fn test_threshold_above_root_yields_nothing() {
        let tree = QuadTree::new(Mbr::unit(), 0, 4, by_level).unwrap();
        assert!(tree.calc_coverage(1.5, 100).is_empty());
    }

    #[test]
    fn test_zero_budget_yields_nothing() {
        let tree = QuadTree::new(Mbr::unit(), 0, 2, by_level).unwrap();
        assert!(tree.calc_coverage(0.0, 0).is_empty());
    }

    #[test]
    fn test_pruned_subtree_is_never_visited() {
        let calls = AtomicUsize::new(0);
        let importance = |node: &Node| {
            calls.fetch_add(1, Ordering::Relaxed);
            // Only the x == 0 half of level 1 is interesting
            if node.level == 1 && node.x == 1 {
                0.0
            } else {
                1.0
            }
        };
        let tree = QuadTree::new(Mbr::unit(), 0, 2, &importance).unwrap();
        let coverage = tree.calc_coverage(0.5, 100);

        // root + 4 level-1 + 8 level-2 under the two surviving parents
        assert_eq!(calls.load(Ordering::Relaxed), 13);
        assert_eq!(coverage.len(), 8);
        assert!(coverage.iter().all(|n| n.node.x < 2));
    }

    #[test]
    fn test_budget_trim_matches_sorting_every_leaf() {
        let importance = |node: &Node| ((node.x * 31 + node.y * 17) % 23) as f64;
        let tree = QuadTree::new(Mbr::unit(), 0, 6, importance).unwrap();
        let coverage = tree.calc_coverage(0.0, 50);

        let mut all: Vec<ImportantNode> = (0..64u32)
            .flat_map(|x| (0..64u32).map(move |y| Node::new(x, y, 6)))
            .map(|node| ImportantNode::new(node, importance(&node)))
            .collect();
        all.sort();
        all.truncate(50);

        let selected: Vec<ImportantNode> = coverage.into_iter().collect();
        assert_eq!(selected, all);
    }

    #[test]
    fn test_deep_tree_with_small_budget() {
        let tree = QuadTree::new(Mbr::unit(), 0, 8, |_: &Node| 1.0).unwrap();
        let coverage = tree.calc_coverage(0.5, 4);

        let nodes: Vec<Node> = coverage.iter().map(|n| n.node).collect();
        assert_eq!(
            nodes,
            vec![
                Node::new(0, 0, 8),
                Node::new(0, 1, 8),
                Node::new(0, 2, 8),
                Node::new(0, 3, 8),
            ]
        );
    }

    #[test]
    fn test_min_level_starts_from_full_grid() {
        let tree = QuadTree::new(Mbr::unit(), 1, 1, by_level).unwrap();
        let coverage = tree.calc_coverage(0.0, 100);
        assert_eq!(coverage.len(), 4);
    }

    #[test]
    fn test_budget_prefers_higher_importance() {
        // Importance grows towards the origin corner
        let importance = |node: &Node| {
            let scale = node.grid_size() as f64;
            2.0 - (node.x as f64 + node.y as f64) / scale
        };
        let tree = QuadTree::new(Mbr::unit(), 0, 3, importance).unwrap();
        let coverage = tree.calc_coverage(0.0, 3);

        let top = coverage.iter().next().unwrap();
        assert_eq!(top.node, Node::new(0, 0, 3));
        assert_eq!(coverage.len(), 3);
    }

    #[test]
    fn test_generate_mbr_rejects_out_of_range_nodes() {
        let tree = QuadTree::new(Mbr::unit(), 1, 3, by_level).unwrap();
        assert!(tree.generate_mbr_for_node(&Node::root()).is_err());
        assert!(tree.generate_mbr_for_node(&Node::new(0, 0, 4)).is_err());
        assert!(tree.generate_mbr_for_node(&Node::new(2, 0, 1)).is_err());
        assert!(tree.generate_mbr_for_node(&Node::new(1, 1, 1)).is_ok());
    }

    #[test]
    fn test_level_tiles_cover_root_exactly() {
        let root = Mbr::new(-20037508.34, -20037508.34, 20037508.34, 20037508.34).unwrap();
        let tree = QuadTree::new(root, 0, 4, by_level).unwrap();
        let level = 4;
        let n = 1u32 << level;

        let mut area = 0.0;
        for x in 0..n {
            for y in 0..n {
                let cell = tree.generate_mbr_for_node(&Node::new(x, y, level)).unwrap();
                area += cell.area();
                if x + 1 < n {
                    let right = tree.generate_mbr_for_node(&Node::new(x + 1, y, level)).unwrap();
                    assert_eq!(cell.max_x(), right.min_x());
                }
                if y + 1 < n {
                    let up = tree.generate_mbr_for_node(&Node::new(x, y + 1, level)).unwrap();
                    assert_eq!(cell.max_y(), up.min_y());
                }
                if x == 0 {
                    assert_eq!(cell.min_x(), root.min_x());
                }
                if x + 1 == n {
                    assert_eq!(cell.max_x(), root.max_x());
                }
                if y == 0 {
                    assert_eq!(cell.min_y(), root.min_y());
                }
                if y + 1 == n {
                    assert_eq!(cell.max_y(), root.max_y());
                }
            }
        }
        assert!((area - root.area()).abs() / root.area() < 1e-9);
    }

    fn arb_mbr() -> impl Strategy<Value = Mbr> {
        (-1000.0f64..1000.0, -1000.0f64..1000.0, 0.001f64..500.0, 0.001f64..500.0)
            .prop_map(|(x, y, w, h)| Mbr::new(x, y, x + w, y + h).unwrap())
    }

    fn arb_node(max_level: u32) -> impl Strategy<Value = Node> {
        (0..max_level).prop_flat_map(|level| {
            let n = 1u32 << level;
            (0..n, 0..n).prop_map(move |(x, y)| Node::new(x, y, level))
        })
    }

    proptest! {
        #[test]
        fn prop_children_partition_parent(mbr in arb_mbr(), node in arb_node(12)) {
            let tree = QuadTree::new(mbr, 0, 12, by_level).unwrap();
            let parent = tree.generate_mbr_for_node(&node).unwrap();
            let [ll, lr, ul, ur] = node.children().map(|c| tree.generate_mbr_for_node(&c).unwrap());

            // Outer edges coincide with the parent
            prop_assert_eq!(ll.min_x(), parent.min_x());
            prop_assert_eq!(ll.min_y(), parent.min_y());
            prop_assert_eq!(ur.max_x(), parent.max_x());
            prop_assert_eq!(ur.max_y(), parent.max_y());
            prop_assert_eq!(lr.max_x(), parent.max_x());
            prop_assert_eq!(ul.max_y(), parent.max_y());

            // Inner edges are shared, so there is no gap and no overlap
            prop_assert_eq!(ll.max_x(), lr.min_x());
            prop_assert_eq!(ul.max_x(), ur.min_x());
            prop_assert_eq!(ll.max_y(), ul.min_y());
            prop_assert_eq!(lr.max_y(), ur.min_y());
            prop_assert_eq!(ll.max_x(), ul.max_x());
            prop_assert_eq!(ll.max_y(), lr.max_y());
        }

        #[test]
        fn prop_coverage_respects_budget_and_levels(
            min_level in 0u32..3,
            extra in 0u32..3,
            threshold in 0.0f64..1.0,
            max_nodes in 0usize..40,
        ) {
            let max_level = min_level + extra;
            let importance = |node: &Node| {
                // Deterministic, non-monotonic pseudo-random score
                let h = (node.x.wrapping_mul(73856093)
                    ^ node.y.wrapping_mul(19349663)
                    ^ node.level.wrapping_mul(83492791))
                    % 1000;
                h as f64 / 1000.0
            };
            let tree = QuadTree::new(Mbr::unit(), min_level, max_level, importance).unwrap();
            let coverage = tree.calc_coverage(threshold, max_nodes);

            prop_assert!(coverage.len() <= max_nodes);
            for n in &coverage {
                prop_assert!(n.node.level >= min_level && n.node.level <= max_level);
                prop_assert!(n.importance >= threshold);
                prop_assert_eq!(n.importance, tree.importance_fn().importance(&n.node));
                // Every ancestor down from min_level passed the threshold too
                let mut cursor = n.node.parent();
                while let Some(ancestor) = cursor {
                    if ancestor.level < min_level {
                        break;
                    }
                    prop_assert!(tree.importance_fn().importance(&ancestor) >= threshold);
                    cursor = ancestor.parent();
                }
            }
        }
    }
}
