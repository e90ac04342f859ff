//! Build results consumed by the runtime.

use glam::Vec3;
use serde::Serialize;
use visbake_core::{Aabb, BitVec};
use visbake_voxel::AabbTree;

use crate::bsp::BspTree;
use crate::flow::FlowStats;

/// Maps a world point to a region id.
#[derive(Clone, Debug, Serialize)]
pub enum SpatialIndex {
    /// Cluster boxes of the voxel pipeline.
    AabbTree(AabbTree<u32>),
    /// Compact tree of the BSP pipeline.
    Bsp(BspTree),
}

impl SpatialIndex {
    /// Region holding `point`, if any.
    pub fn find_region(&self, point: Vec3) -> Option<u32> {
        match self {
            Self::AabbTree(tree) => tree.find(point).copied(),
            Self::Bsp(tree) => tree.find_leaf(point),
        }
    }
}

/// Visibility of one region.
#[derive(Clone, Debug, Serialize)]
pub struct PvsRecord {
    /// Regions visible from this one, always including itself.
    pub visible: BitVec,
    /// Mesh groups with a polygon in this region.
    pub mesh_groups: BitVec,
    /// World bounds, for debugging.
    pub bounds: Aabb,
}

/// Counters gathered during a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Solid voxels, or BSP input faces.
    pub occluders: usize,
    /// Areas grown, or BSP leaves.
    pub areas: usize,
    /// Regions before pruning.
    pub regions_before_prune: usize,
    /// Regions in the output.
    pub regions: usize,
    pub portals: usize,
    pub might_see: usize,
    pub visible: usize,
}

impl BuildStats {
    pub(crate) fn with_flow(mut self, flow: &FlowStats) -> Self {
        self.portals = flow.portals;
        self.might_see = flow.might_see;
        self.visible = flow.visible;
        self
    }
}

/// Everything one visibility build produces.
#[derive(Clone, Debug, Serialize)]
pub struct VisOutput {
    pub index: SpatialIndex,
    /// Indexed by region id.
    pub regions: Vec<PvsRecord>,
    /// The level was open to the void; nothing was pruned.
    pub leaked: bool,
    /// BSP builds only: one bit per input face (occluder polygons in scene
    /// order, then hints), set when some side of the face is seen from open
    /// space. Faces left unset can be dropped from the rendered level.
    pub visible_faces: Option<BitVec>,
    pub stats: BuildStats,
}

impl VisOutput {
    /// Region holding `point`, if any.
    pub fn find_region(&self, point: Vec3) -> Option<u32> {
        self.index.find_region(point)
    }

    /// True if region `from` may see region `to`.
    pub fn can_see(&self, from: u32, to: u32) -> bool {
        self.regions
            .get(from as usize)
            .is_some_and(|r| (to as usize) < r.visible.len() && r.visible.get(to as usize))
    }

    /// Regions visible from the region holding `point`.
    pub fn visible_from(&self, point: Vec3) -> Option<&BitVec> {
        let region = self.find_region(point)?;
        self.regions.get(region as usize).map(|r| &r.visible)
    }
}
