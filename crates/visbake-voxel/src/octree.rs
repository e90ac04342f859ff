//! Sparse voxel octree index.
//!
//! Maps occupied voxel coordinates to values. Uniform regions collapse
//! into single leaves, so large empty or solid spaces cost one node, and
//! segment queries can skip whole empty subtrees.

use glam::Vec3;
use visbake_core::VoxelCoord;

/// Voxel boxes are shrunk by this much (in voxel units) for segment tests,
/// so segments that only graze a voxel face do not count as hits.
const SEGMENT_SHRINK: f32 = 1e-3;

/// A node in the sparse voxel octree.
#[derive(Clone, Debug)]
pub enum OctreeNode<T> {
    /// No occupied voxel below this node.
    Empty,
    /// Every voxel below this node holds the same value.
    Leaf(T),
    /// Branch node with 8 children.
    Branch(Box<[OctreeNode<T>; 8]>),
}

impl<T: Copy + PartialEq> OctreeNode<T> {
    /// Check if the node is empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Check if the node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Get the value if this is a leaf node.
    pub fn as_leaf(&self) -> Option<T> {
        match self {
            Self::Leaf(value) => Some(*value),
            _ => None,
        }
    }

    /// Count total nodes in this subtree.
    pub fn count_nodes(&self) -> usize {
        match self {
            Self::Empty | Self::Leaf(_) => 1,
            Self::Branch(children) => {
                1 + children.iter().map(OctreeNode::count_nodes).sum::<usize>()
            }
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Leaf(a), Self::Leaf(b)) => a == b,
            _ => false,
        }
    }
}

/// Sparse octree over a cube of `2^depth` voxels per axis.
#[derive(Clone, Debug)]
pub struct VoxelOctree<T> {
    root: OctreeNode<T>,
    depth: u32,
    len: usize,
}

impl<T: Copy + PartialEq> VoxelOctree<T> {
    /// Create a new empty octree with the given depth.
    /// Size will be 2^depth voxels per axis.
    pub fn new(depth: u32) -> Self {
        Self {
            root: OctreeNode::Empty,
            depth,
            len: 0,
        }
    }

    /// Smallest octree that covers a grid with the given per-axis counts.
    pub fn covering(counts: [u32; 3]) -> Self {
        let largest = counts.into_iter().max().unwrap_or(1).max(1);
        Self::new(largest.next_power_of_two().trailing_zeros())
    }

    /// Get the root node.
    pub fn root(&self) -> &OctreeNode<T> {
        &self.root
    }

    /// Voxels per axis.
    #[inline]
    pub fn size(&self) -> u32 {
        1 << self.depth
    }

    /// Tree depth.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of occupied voxels.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no voxel is occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn in_range(&self, coord: VoxelCoord) -> bool {
        let size = self.size() as i32;
        (0..size).contains(&coord.x) && (0..size).contains(&coord.y) && (0..size).contains(&coord.z)
    }

    /// Get the child index for a position at a given level.
    fn child_index(x: u32, y: u32, z: u32, level: u32) -> usize {
        let bit = 1 << level;
        let xi = usize::from((x & bit) != 0);
        let yi = usize::from((y & bit) != 0);
        let zi = usize::from((z & bit) != 0);
        xi | (yi << 1) | (zi << 2)
    }

    /// Value stored at `coord`, if occupied.
    pub fn get(&self, coord: VoxelCoord) -> Option<T> {
        if !self.in_range(coord) {
            return None;
        }
        let (x, y, z) = (coord.x as u32, coord.y as u32, coord.z as u32);
        let mut node = &self.root;
        let mut level = self.depth;
        loop {
            match node {
                OctreeNode::Empty => return None,
                OctreeNode::Leaf(value) => return Some(*value),
                OctreeNode::Branch(children) => {
                    if level == 0 {
                        return None;
                    }
                    level -= 1;
                    node = &children[Self::child_index(x, y, z, level)];
                }
            }
        }
    }

    /// Occupy `coord` with `value`. Out of range coordinates are ignored.
    pub fn insert(&mut self, coord: VoxelCoord, value: T) {
        self.store(coord, Some(value));
    }

    /// Clear `coord`.
    pub fn remove(&mut self, coord: VoxelCoord) {
        self.store(coord, None);
    }

    fn store(&mut self, coord: VoxelCoord, value: Option<T>) {
        if !self.in_range(coord) {
            return;
        }
        let before = self.get(coord).is_some();
        let (x, y, z) = (coord.x as u32, coord.y as u32, coord.z as u32);
        Self::set_recursive(&mut self.root, x, y, z, self.depth, value);
        match (before, value.is_some()) {
            (false, true) => self.len += 1,
            (true, false) => self.len -= 1,
            _ => {}
        }
    }

    fn set_recursive(
        node: &mut OctreeNode<T>,
        x: u32,
        y: u32,
        z: u32,
        level: u32,
        value: Option<T>,
    ) {
        if level == 0 {
            *node = value.map_or(OctreeNode::Empty, OctreeNode::Leaf);
            return;
        }

        if !matches!(node, OctreeNode::Branch(_)) {
            // Expand to a branch carrying the old value in every child.
            let old = node.clone();
            *node = OctreeNode::Branch(Box::new(std::array::from_fn(|_| old.clone())));
        }
        if let OctreeNode::Branch(children) = &mut *node {
            let idx = Self::child_index(x, y, z, level - 1);
            Self::set_recursive(&mut children[idx], x, y, z, level - 1, value);
        }

        Self::try_collapse(node);
    }

    /// Collapse a branch whose children are identical leaves or all empty.
    fn try_collapse(node: &mut OctreeNode<T>) {
        let OctreeNode::Branch(children) = &*node else {
            return;
        };
        let first = &children[0];
        if matches!(first, OctreeNode::Branch(_)) {
            return;
        }
        if children[1..].iter().all(|c| c.same_as(first)) {
            let collapsed = first.clone();
            *node = collapsed;
        }
    }

    /// Value of the voxel containing `point`, given in voxel units.
    pub fn contains_point(&self, point: Vec3) -> Option<T> {
        if point.min_element() < 0.0 {
            return None;
        }
        let f = point.floor();
        self.get(VoxelCoord::new(f.x as i32, f.y as i32, f.z as i32))
    }

    /// True if the segment `a..b` (voxel units) lies inside a single empty
    /// node, which proves it hits nothing without walking the tree.
    pub fn empty_node_contains_segment(&self, a: Vec3, b: Vec3) -> bool {
        let size = self.size() as f32;
        let lo = a.min(b);
        let hi = a.max(b);
        if lo.min_element() < 0.0 || hi.max_element() >= size {
            // Outside the covered cube nothing is stored.
            return self.is_empty()
                || lo.cmpge(Vec3::splat(size)).any()
                || hi.cmplt(Vec3::ZERO).any();
        }

        let mut node = &self.root;
        let mut origin = Vec3::ZERO;
        let mut half = size * 0.5;
        loop {
            match node {
                OctreeNode::Empty => return true,
                OctreeNode::Leaf(_) => return false,
                OctreeNode::Branch(children) => {
                    let mid = origin + Vec3::splat(half);
                    let a_hi = a.cmpge(mid);
                    let b_hi = b.cmpge(mid);
                    if a_hi != b_hi {
                        return false;
                    }
                    let idx = usize::from(a_hi.test(0))
                        | (usize::from(a_hi.test(1)) << 1)
                        | (usize::from(a_hi.test(2)) << 2);
                    origin = Vec3::select(a_hi, mid, origin);
                    half *= 0.5;
                    node = &children[idx];
                }
            }
        }
    }

    /// True if the segment `a..b` (voxel units) passes through any occupied voxel.
    pub fn segment_hits(&self, a: Vec3, b: Vec3) -> bool {
        Self::segment_hits_recursive(&self.root, Vec3::ZERO, self.size() as f32, a, b)
    }

    fn segment_hits_recursive(node: &OctreeNode<T>, origin: Vec3, size: f32, a: Vec3, b: Vec3) -> bool {
        match node {
            OctreeNode::Empty => false,
            OctreeNode::Leaf(_) => segment_overlaps_cube(origin, size, a, b, SEGMENT_SHRINK),
            OctreeNode::Branch(children) => {
                if !segment_overlaps_cube(origin, size, a, b, 0.0) {
                    return false;
                }
                let half = size * 0.5;
                children.iter().enumerate().any(|(idx, child)| {
                    let offset = Vec3::new(
                        (idx & 1) as f32,
                        ((idx >> 1) & 1) as f32,
                        ((idx >> 2) & 1) as f32,
                    ) * half;
                    Self::segment_hits_recursive(child, origin + offset, half, a, b)
                })
            }
        }
    }
}

/// Slab test of the segment `a..b` against the cube `[origin, origin + size]`
/// shrunk by `shrink` on every side.
fn segment_overlaps_cube(origin: Vec3, size: f32, a: Vec3, b: Vec3, shrink: f32) -> bool {
    let lo = origin + Vec3::splat(shrink);
    let hi = origin + Vec3::splat(size - shrink);
    let dir = b - a;
    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;
    for axis in 0..3 {
        if dir[axis].abs() < f32::EPSILON {
            if a[axis] < lo[axis] || a[axis] > hi[axis] {
                return false;
            }
            continue;
        }
        let inv = 1.0 / dir[axis];
        let mut t0 = (lo[axis] - a[axis]) * inv;
        let mut t1 = (hi[axis] - a[axis]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_octree() {
        let octree = VoxelOctree::<u8>::new(5); // 32x32x32
        assert!(octree.is_empty());
        assert_eq!(octree.size(), 32);
        assert_eq!(octree.get(VoxelCoord::new(0, 0, 0)), None);
    }

    #[test]
    fn insert_get_remove() {
        let mut octree = VoxelOctree::new(5);
        let c = VoxelCoord::new(10, 15, 20);
        octree.insert(c, 42u8);
        assert_eq!(octree.get(c), Some(42));
        assert_eq!(octree.get(VoxelCoord::new(0, 0, 0)), None);
        assert_eq!(octree.len(), 1);
        octree.remove(c);
        assert!(octree.is_empty());
        assert_eq!(octree.len(), 0);
    }

    #[test]
    fn collapse_uniform_region() {
        let mut octree = VoxelOctree::new(2); // 4x4x4
        for z in 0..4 {
            for y in 0..4 {
                for x in 0..4 {
                    octree.insert(VoxelCoord::new(x, y, z), 1u8);
                }
            }
        }
        assert!(octree.root().is_leaf());
        assert_eq!(octree.root().as_leaf(), Some(1));
        assert_eq!(octree.len(), 64);
    }

    #[test]
    fn out_of_bounds_access() {
        let mut octree = VoxelOctree::new(3);
        assert_eq!(octree.get(VoxelCoord::new(100, 100, 100)), None);
        octree.insert(VoxelCoord::new(100, 100, 100), 1u8);
        octree.insert(VoxelCoord::new(-1, 0, 0), 1u8);
        assert!(octree.is_empty());
    }

    #[test]
    fn covering_depth() {
        assert_eq!(VoxelOctree::<u8>::covering([14, 3, 9]).size(), 16);
        assert_eq!(VoxelOctree::<u8>::covering([16, 16, 16]).size(), 16);
        assert_eq!(VoxelOctree::<u8>::covering([17, 1, 1]).size(), 32);
    }

    #[test]
    fn segment_queries() {
        let mut octree = VoxelOctree::new(4);
        octree.insert(VoxelCoord::new(8, 8, 8), ());

        let a = Vec3::new(0.5, 8.5, 8.5);
        let b = Vec3::new(15.5, 8.5, 8.5);
        assert!(octree.segment_hits(a, b));
        assert!(!octree.empty_node_contains_segment(a, b));

        // Passing just above the voxel.
        let a = Vec3::new(0.5, 9.5, 8.5);
        let b = Vec3::new(15.5, 9.5, 8.5);
        assert!(!octree.segment_hits(a, b));

        // Grazing the top face does not count.
        let a = Vec3::new(0.5, 9.0, 8.5);
        let b = Vec3::new(15.5, 9.0, 8.5);
        assert!(!octree.segment_hits(a, b));

        // Both endpoints in the same empty octant.
        assert!(octree.empty_node_contains_segment(Vec3::splat(0.5), Vec3::splat(3.5)));
        assert_eq!(octree.contains_point(Vec3::splat(8.2)), Some(()));
        assert_eq!(octree.contains_point(Vec3::splat(7.9)), None);
    }
}
