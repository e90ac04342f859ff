//! Directed portals between regions, and portal generation for areas.

use glam::Vec3;
use hashbrown::HashMap;
use visbake_core::{Direction, Plane, VoxelBox, Winding};
use visbake_voxel::VoxelGrid;

use crate::area::{Area, AreaLookup};

/// A directed opening from region `from` into region `to`.
///
/// The plane normal points into `to`.
#[derive(Clone, Debug)]
pub struct Portal {
    pub from: u32,
    pub to: u32,
    pub winding: Winding,
    pub plane: Plane,
    pub origin: Vec3,
    pub radius: f32,
}

impl Portal {
    pub fn new(from: u32, to: u32, winding: Winding) -> Self {
        let origin = winding.center();
        Self {
            from,
            to,
            plane: winding.plane(),
            radius: winding.radius_from(origin),
            origin,
            winding,
        }
    }

    /// The matching portal leading back.
    pub fn reversed(&self) -> Self {
        Self::new(self.to, self.from, self.winding.reversed())
    }

    /// Same portal between different regions.
    pub fn rehomed(&self, from: u32, to: u32) -> Self {
        Self {
            from,
            to,
            ..self.clone()
        }
    }
}

/// Build the outgoing portals of area `id`.
///
/// Every voxel just outside each face of the area is looked up in
/// `lookup`; voxels are grouped by the area that owns them, and each group
/// becomes one quad on the shared face, facing into the neighbor.
pub fn area_portals(grid: &VoxelGrid, lookup: &AreaLookup, areas: &[Area], id: u32) -> Vec<Portal> {
    let bounds = areas[id as usize].bounds;
    let grid_box = grid.grid_box();
    let mut portals = Vec::new();

    for dir in Direction::ALL {
        let Some(layer) = bounds.face_layer(dir).intersection(&grid_box) else {
            continue;
        };

        let mut shared: HashMap<u32, VoxelBox> = HashMap::new();
        for coord in layer.iter() {
            let Some(neighbor) = lookup.at(coord) else {
                continue;
            };
            shared
                .entry(neighbor)
                .and_modify(|b| *b = b.union(&VoxelBox::single(coord)))
                .or_insert_with(|| VoxelBox::single(coord));
        }

        let mut neighbors: Vec<_> = shared.into_iter().collect();
        neighbors.sort_unstable_by_key(|(n, _)| *n);

        let axis = dir.axis().index();
        let face = if dir.is_positive() {
            bounds.max.get(dir.axis()) + 1
        } else {
            bounds.min.get(dir.axis())
        };
        for (neighbor, voxels) in neighbors {
            let lo = grid.to_world(voxels.min.to_ivec3().as_vec3());
            let hi = grid.to_world((voxels.max.to_ivec3() + glam::IVec3::ONE).as_vec3());
            let at = grid.mins()[axis] + face as f32 * grid.voxel_size()[axis];
            if let Some(winding) = Winding::axial_rect(axis, at, lo, hi, dir.is_positive()) {
                portals.push(Portal::new(id, neighbor, winding));
            }
        }
    }
    portals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::grow_boxes;
    use approx::assert_relative_eq;
    use visbake_core::{Aabb, VoxelCoord};

    #[test]
    fn reversed_portal_faces_back() {
        let w = Winding::axial_rect(0, 2.0, Vec3::ZERO, Vec3::ONE, true).unwrap();
        let p = Portal::new(3, 7, w);
        let r = p.reversed();
        assert_eq!((r.from, r.to), (7, 3));
        assert_relative_eq!(r.plane.normal.x, -p.plane.normal.x);
        assert_relative_eq!(r.plane.dist, -p.plane.dist);
        assert_relative_eq!(r.radius, p.radius);
    }

    #[test]
    fn neighbors_get_mutual_portals() {
        let grid = VoxelGrid::new(Aabb::new(Vec3::ZERO, Vec3::splat(4.0)), Vec3::ONE).unwrap();
        // Split the grid at x == 3 so two areas share a face.
        let left = grow_boxes(&grid.grid_box(), |c: VoxelCoord| c.x < 3).unwrap();
        let right = grow_boxes(&grid.grid_box(), |c: VoxelCoord| c.x >= 3).unwrap();
        let areas: Vec<Area> = left.into_iter().chain(right).map(Area::new).collect();
        assert_eq!(areas.len(), 2);
        let lookup = AreaLookup::new(areas.iter().map(|a| &a.bounds).zip(0u32..)).unwrap();

        let a = area_portals(&grid, &lookup, &areas, 0);
        let b = area_portals(&grid, &lookup, &areas, 1);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        assert_eq!((a[0].from, a[0].to), (0, 1));
        assert_relative_eq!(a[0].plane.normal.x, 1.0);
        // Face between grid x 2 and 3, world x == 2 after padding.
        assert_relative_eq!(a[0].plane.dist, 2.0, epsilon = 1e-5);
        assert_relative_eq!(b[0].plane.normal.x, -1.0);
        assert_relative_eq!(b[0].plane.dist, -2.0, epsilon = 1e-5);
        assert_relative_eq!(a[0].winding.area(), 36.0, epsilon = 1e-3);
        assert!(a[0].origin.distance(b[0].origin) < 1e-5);
    }
}
