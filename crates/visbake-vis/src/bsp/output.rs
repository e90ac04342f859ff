//! Compact BSP tree for runtime point and polygon lookups.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::Serialize;
use visbake_core::constants::ON_EPSILON;
use visbake_core::{Plane, Result, Winding, WindingSide};

use crate::bsp::tree::BspArena;

/// Child value of a leaf nobody can see into.
pub const OPAQUE_LEAF: i32 = i32::MIN;

/// One split node.
///
/// A child `>= 0` indexes another node; `-1 - id` is the open leaf with
/// region `id`; [`OPAQUE_LEAF`] is solid.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize)]
pub struct BspTreeNode {
    pub normal: [f32; 3],
    pub dist: f32,
    pub children: [i32; 2],
}

impl BspTreeNode {
    #[inline]
    pub fn plane(&self) -> Plane {
        Plane::new(Vec3::from(self.normal), self.dist)
    }
}

/// Read-only BSP, independent of the build arena.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BspTree {
    pub nodes: Vec<BspTreeNode>,
    /// A node index, or a leaf value when the tree has no splits.
    pub root: i32,
}

impl BspTree {
    /// Region of the open leaf holding `point`, or `None` in solid space.
    pub fn find_leaf(&self, point: Vec3) -> Option<u32> {
        let mut child = self.root;
        while child >= 0 {
            let node = &self.nodes[child as usize];
            child = node.children[usize::from(node.plane().distance(point) < 0.0)];
        }
        leaf_region(child)
    }

    /// Call `f` with every open leaf `polygon` overlaps.
    pub fn classify_polygon(&self, polygon: &Winding, f: &mut impl FnMut(u32)) -> Result<()> {
        self.classify_from(self.root, polygon, f)
    }

    fn classify_from(&self, child: i32, polygon: &Winding, f: &mut impl FnMut(u32)) -> Result<()> {
        if child < 0 {
            if let Some(region) = leaf_region(child) {
                f(region);
            }
            return Ok(());
        }
        let node = &self.nodes[child as usize];
        let plane = node.plane();
        let [front, back] = node.children;
        match polygon.plane_side(&plane) {
            WindingSide::Front => self.classify_from(front, polygon, f),
            WindingSide::Back => self.classify_from(back, polygon, f),
            WindingSide::On => {
                self.classify_from(front, polygon, f)?;
                self.classify_from(back, polygon, f)
            }
            WindingSide::Cross => {
                let (fw, bw) = polygon.clip_epsilon(&plane, ON_EPSILON)?;
                if let Some(fw) = fw {
                    self.classify_from(front, &fw, f)?;
                }
                if let Some(bw) = bw {
                    self.classify_from(back, &bw, f)?;
                }
                Ok(())
            }
        }
    }

    /// The node array as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }
}

fn leaf_region(child: i32) -> Option<u32> {
    (child != OPAQUE_LEAF).then(|| (-1 - child) as u32)
}

/// Flatten the arena under its root in pre-order.
pub fn build_output_tree(arena: &BspArena) -> BspTree {
    let mut nodes = Vec::new();
    let root = emit(arena, arena.root, &mut nodes);
    BspTree { nodes, root }
}

fn emit(arena: &BspArena, node: u32, out: &mut Vec<BspTreeNode>) -> i32 {
    let n = &arena.nodes[node as usize];
    if n.is_leaf {
        return match n.leaf_id {
            Some(id) if n.is_open_leaf() => -1 - id as i32,
            _ => OPAQUE_LEAF,
        };
    }
    let index = out.len();
    out.push(BspTreeNode {
        normal: n.plane.normal.to_array(),
        dist: n.plane.dist,
        children: [OPAQUE_LEAF; 2],
    });
    let front = emit(arena, n.children[0], out);
    let back = emit(arena, n.children[1], out);
    out[index].children = [front, back];
    index as i32
}
