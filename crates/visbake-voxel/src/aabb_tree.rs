//! Static bounding-volume tree over boxes.
//!
//! Built once from a list of `(Aabb, T)` leaves by recursive median
//! splits on the longest axis of the leaf centers. Nodes live in one
//! flat array; the root is node 0.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use visbake_core::{Aabb, Error, Result};

/// Sentinel child index for leaves.
const NO_CHILD: u32 = u32::MAX;

/// A node of an [`AabbTree`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AabbNode<T> {
    pub bounds: Aabb,
    /// Child node indices; both `NO_CHILD` on leaves.
    pub children: [u32; 2],
    /// Payload, set only on leaves.
    pub value: Option<T>,
}

impl<T> AabbNode<T> {
    /// True if this node holds a value.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children[0] == NO_CHILD
    }
}

/// Binary tree of boxes with a value on every leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AabbTree<T> {
    nodes: Vec<AabbNode<T>>,
}

impl<T> Default for AabbTree<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T: Copy> AabbTree<T> {
    /// Build a tree over `leaves`.
    ///
    /// Backwards boxes are rejected; they would silently make lookups miss.
    pub fn build(leaves: Vec<(Aabb, T)>) -> Result<Self> {
        if let Some((bounds, _)) = leaves.iter().find(|(b, _)| !b.is_valid()) {
            return Err(Error::Invariant(format!(
                "box tree leaf has backwards bounds {bounds:?}"
            )));
        }
        let mut tree = Self {
            nodes: Vec::with_capacity(leaves.len().saturating_mul(2)),
        };
        if !leaves.is_empty() {
            let mut leaves = leaves;
            tree.build_recursive(&mut leaves);
        }
        Ok(tree)
    }

    fn build_recursive(&mut self, leaves: &mut [(Aabb, T)]) -> u32 {
        let index = self.nodes.len() as u32;
        let bounds = leaves
            .iter()
            .fold(Aabb::EMPTY, |acc, (b, _)| acc.merge(b));

        if let [(leaf_bounds, value)] = leaves {
            self.nodes.push(AabbNode {
                bounds: *leaf_bounds,
                children: [NO_CHILD; 2],
                value: Some(*value),
            });
            return index;
        }

        self.nodes.push(AabbNode {
            bounds,
            children: [NO_CHILD; 2],
            value: None,
        });

        let centers = Aabb::from_points(leaves.iter().map(|(b, _)| b.center()));
        let axis = centers.longest_axis();
        let mid = leaves.len() / 2;
        leaves.select_nth_unstable_by(mid, |(a, _), (b, _)| {
            a.center()[axis].total_cmp(&b.center()[axis])
        });
        let (left, right) = leaves.split_at_mut(mid);
        let l = self.build_recursive(left);
        let r = self.build_recursive(right);
        self.nodes[index as usize].children = [l, r];
        index
    }
}

impl<T> AabbTree<T> {
    /// All nodes, root first.
    pub fn nodes(&self) -> &[AabbNode<T>] {
        &self.nodes
    }

    /// True if the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounds of everything in the tree.
    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::EMPTY, |n| n.bounds)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Value of the first leaf whose box contains `point`.
    pub fn find(&self, point: Vec3) -> Option<&T> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut stack = vec![0u32];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.contains_point(point) {
                continue;
            }
            if node.is_leaf() {
                return node.value.as_ref();
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Call `f` with the value of every leaf whose box overlaps `bounds`.
    pub fn query_box(&self, bounds: &Aabb, mut f: impl FnMut(&Aabb, &T)) {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = vec![0u32];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.intersects(bounds) {
                continue;
            }
            match &node.value {
                Some(value) => f(&node.bounds, value),
                None => stack.extend(node.children.iter().rev()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32) -> Aabb {
        Aabb::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn find_returns_containing_leaf() {
        let leaves: Vec<_> = (0..10).map(|i| (unit_box(i as f32), i)).collect();
        let tree = AabbTree::build(leaves).unwrap();
        assert_eq!(tree.leaf_count(), 10);
        assert_eq!(tree.nodes().len(), 19);
        for i in 0..10 {
            assert_eq!(tree.find(Vec3::new(i as f32 + 0.5, 0.5, 0.5)), Some(&i));
        }
        assert_eq!(tree.find(Vec3::new(-0.5, 0.5, 0.5)), None);
        assert_eq!(tree.find(Vec3::new(3.5, 2.0, 0.5)), None);
    }

    #[test]
    fn query_box_visits_overlaps() {
        let leaves: Vec<_> = (0..8).map(|i| (unit_box(i as f32 * 2.0), i)).collect();
        let tree = AabbTree::build(leaves).unwrap();
        let mut hits = Vec::new();
        tree.query_box(
            &Aabb::new(Vec3::new(1.5, 0.2, 0.2), Vec3::new(4.5, 0.8, 0.8)),
            |_, v| hits.push(*v),
        );
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn backwards_bounds_are_rejected() {
        let bad = Aabb::new(Vec3::ONE, Vec3::ZERO);
        assert!(matches!(
            AabbTree::build(vec![(bad, 0u32)]),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn empty_tree() {
        let tree = AabbTree::<u32>::build(Vec::new()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.find(Vec3::ZERO), None);
        assert!(!tree.bounds().is_valid());
    }
}
