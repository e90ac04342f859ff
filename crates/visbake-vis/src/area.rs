//! Areas: maximal boxes of empty voxels.

use glam::Vec3;
use visbake_core::{Aabb, Direction, Error, Result, VoxelBox, VoxelCoord};
use visbake_voxel::AabbTree;

/// A box of contiguous empty voxels.
#[derive(Clone, Debug)]
pub struct Area {
    pub bounds: VoxelBox,
    /// Owning cluster, once clustering has run.
    pub group: Option<u32>,
    /// Outgoing portal ids.
    pub portals: Vec<u32>,
}

impl Area {
    pub fn new(bounds: VoxelBox) -> Self {
        Self {
            bounds,
            group: None,
            portals: Vec::new(),
        }
    }
}

/// Cover every voxel of `region` that `accept` admits with greedy boxes.
///
/// Seeds are taken in scan order (x fastest). Each seed grows through
/// [`Direction::ALL`] in order, one voxel layer at a time, until the next
/// layer would leave `region`, touch an already claimed voxel, or include a
/// voxel `accept` rejects. The boxes are disjoint and their union is exactly
/// the accepted voxels.
pub fn grow_boxes(region: &VoxelBox, accept: impl Fn(VoxelCoord) -> bool) -> Result<Vec<VoxelBox>> {
    let extent = region.extent();
    let local = |c: VoxelCoord| {
        let d = c.to_ivec3() - region.min.to_ivec3();
        d.x as usize + d.y as usize * extent.x as usize + d.z as usize * (extent.x * extent.y) as usize
    };

    let mut claimed = vec![false; region.volume()];
    let mut remaining = region.iter().filter(|c| accept(*c)).count();
    let mut boxes = Vec::new();
    let mut cursor = region.iter();

    while remaining > 0 {
        let seed = cursor
            .find(|c| !claimed[local(*c)] && accept(*c))
            .ok_or_else(|| {
                Error::Invariant(format!(
                    "{remaining} voxels of {region:?} left without a seed"
                ))
            })?;

        let mut grown = VoxelBox::single(seed);
        for dir in Direction::ALL {
            loop {
                let layer = grown.face_layer(dir);
                if !region.contains_box(&layer)
                    || layer.iter().any(|c| claimed[local(c)] || !accept(c))
                {
                    break;
                }
                grown = grown.extended(dir);
            }
        }

        for c in grown.iter() {
            claimed[local(c)] = true;
        }
        remaining -= grown.volume();
        boxes.push(grown);
    }
    Ok(boxes)
}

/// Box of `voxels` in voxel units, for the area lookup tree.
pub fn voxel_unit_bounds(voxels: &VoxelBox) -> Aabb {
    Aabb::new(
        voxels.min.to_ivec3().as_vec3(),
        (voxels.max.to_ivec3() + glam::IVec3::ONE).as_vec3(),
    )
}

/// Index from voxel to the id of the box containing it.
#[derive(Clone, Debug, Default)]
pub struct AreaLookup {
    tree: AabbTree<u32>,
}

impl AreaLookup {
    /// Index `(box, id)` pairs.
    pub fn new<'a>(boxes: impl IntoIterator<Item = (&'a VoxelBox, u32)>) -> Result<Self> {
        let leaves = boxes
            .into_iter()
            .map(|(b, id)| (voxel_unit_bounds(b), id))
            .collect();
        Ok(Self {
            tree: AabbTree::build(leaves)?,
        })
    }

    /// Id of the box holding `coord`.
    pub fn at(&self, coord: VoxelCoord) -> Option<u32> {
        self.tree
            .find(coord.to_ivec3().as_vec3() + Vec3::splat(0.5))
            .copied()
    }
}
