//! Boolean occlusion queries.

use glam::Vec3;

use crate::space::VoxelSpace;

/// Answers "is the straight line from `a` to `b` blocked?".
///
/// Used during cluster merging, where only hit / no hit matters.
pub trait OcclusionTracer: Sync {
    /// True if something blocks the segment `start..end`.
    fn trace_line(&self, start: Vec3, end: Vec3) -> bool;
}

/// Traces segments against the solid voxels of a [`VoxelSpace`].
#[derive(Clone, Copy, Debug)]
pub struct VoxelTracer<'a> {
    space: &'a VoxelSpace,
}

impl<'a> VoxelTracer<'a> {
    pub fn new(space: &'a VoxelSpace) -> Self {
        Self { space }
    }
}

impl OcclusionTracer for VoxelTracer<'_> {
    fn trace_line(&self, start: Vec3, end: Vec3) -> bool {
        let a = self.space.grid().to_grid(start);
        let b = self.space.grid().to_grid(end);
        let octree = self.space.octree();
        if octree.empty_node_contains_segment(a, b) {
            return false;
        }
        octree.segment_hits(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::VoxelType;
    use visbake_core::{Aabb, VoxelCoord};

    #[test]
    fn wall_blocks_lines_through_it() {
        let mut space =
            VoxelSpace::new(Aabb::new(Vec3::ZERO, Vec3::splat(10.0)), Vec3::ONE).unwrap();
        // Solid slab at world x in [4, 5], with a hole at y, z in [4, 5].
        for y in 0..12 {
            for z in 0..12 {
                if y == 5 && z == 5 {
                    continue;
                }
                space
                    .set_voxel_type(VoxelCoord::new(5, y, z), VoxelType::Solid)
                    .unwrap();
            }
        }
        let tracer = VoxelTracer::new(&space);
        assert!(tracer.trace_line(Vec3::new(1.0, 2.0, 2.0), Vec3::new(8.0, 2.0, 2.0)));
        assert!(!tracer.trace_line(Vec3::new(1.0, 4.5, 4.5), Vec3::new(8.0, 4.5, 4.5)));
        assert!(!tracer.trace_line(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 8.0, 8.0)));
    }
}
