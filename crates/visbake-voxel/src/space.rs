//! Voxel discretization of a scene.
//!
//! A [`VoxelSpace`] covers the scene bounds padded by one voxel on every
//! side, so the level is always surrounded by a shell of empty "exterior"
//! voxels. Each voxel is either solid or empty; solid voxels are also
//! mirrored into a [`VoxelOctree`] for fast segment queries.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use visbake_core::{Aabb, Error, Plane, Result, VoxelBox, VoxelCoord};

use crate::octree::VoxelOctree;

/// Triangles are pushed this fraction of a voxel behind their surface
/// before the overlap test, so a wall on a voxel boundary claims the
/// voxel behind it rather than the one in front.
const SURFACE_BIAS: f32 = 0.01;
/// Voxels are shrunk by this fraction for the overlap test, so triangles
/// that only touch a voxel's edge or face do not claim it.
const VOXEL_SHRINK: f32 = 0.001;
/// Largest supported number of voxels in one space.
const MAX_VOXELS: i64 = 1 << 31;

/// Occupancy of a single voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VoxelType {
    /// Free space a viewer could stand in or see through.
    #[default]
    Empty = 0,
    /// Blocked by visibility-blocking geometry.
    Solid = 1,
}

/// Placement and resolution of a voxel grid, without any voxel data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelGrid {
    mins: Vec3,
    voxel_size: Vec3,
    counts: IVec3,
}

impl VoxelGrid {
    /// Grid covering `scene_bounds` padded by one voxel on every side.
    pub fn new(scene_bounds: Aabb, voxel_size: Vec3) -> Result<Self> {
        if !voxel_size.cmpgt(Vec3::ZERO).all() || !voxel_size.is_finite() {
            return Err(Error::InvalidOptions(format!(
                "voxel size must be positive, got {voxel_size}"
            )));
        }
        if !scene_bounds.is_valid() || !scene_bounds.min.is_finite() || !scene_bounds.max.is_finite()
        {
            return Err(Error::InvalidData(format!(
                "scene bounds are backwards or not finite: {scene_bounds:?}"
            )));
        }

        let inner = (scene_bounds.size() / voxel_size - Vec3::splat(1e-4))
            .ceil()
            .max(Vec3::ONE);
        let counts = inner.as_ivec3() + IVec3::splat(2);
        let total = i64::from(counts.x) * i64::from(counts.y) * i64::from(counts.z);
        if total > MAX_VOXELS {
            return Err(Error::OutOfBounds(format!(
                "voxel grid {counts} holds {total} voxels, limit is {MAX_VOXELS}"
            )));
        }

        Ok(Self {
            mins: scene_bounds.min - voxel_size,
            voxel_size,
            counts,
        })
    }

    /// World position of the grid's minimum corner.
    #[inline]
    pub fn mins(&self) -> Vec3 {
        self.mins
    }

    /// World size of one voxel.
    #[inline]
    pub fn voxel_size(&self) -> Vec3 {
        self.voxel_size
    }

    /// Number of voxels along each axis.
    #[inline]
    pub fn counts(&self) -> IVec3 {
        self.counts
    }

    /// Total number of voxels.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        (self.counts.x as usize) * (self.counts.y as usize) * (self.counts.z as usize)
    }

    /// The box of every voxel in the grid.
    pub fn grid_box(&self) -> VoxelBox {
        VoxelBox::new(VoxelCoord::new(0, 0, 0), (self.counts - IVec3::ONE).into())
    }

    /// World bounds of the whole grid.
    pub fn bounds(&self) -> Aabb {
        self.get_box_bounds(&self.grid_box())
    }

    /// True if `coord` lies inside the grid.
    #[inline]
    pub fn contains(&self, coord: VoxelCoord) -> bool {
        coord.x >= 0
            && coord.y >= 0
            && coord.z >= 0
            && coord.x < self.counts.x
            && coord.y < self.counts.y
            && coord.z < self.counts.z
    }

    /// True if `coord` touches the outer face of the grid.
    pub fn is_border(&self, coord: VoxelCoord) -> bool {
        coord.x == 0
            || coord.y == 0
            || coord.z == 0
            || coord.x == self.counts.x - 1
            || coord.y == self.counts.y - 1
            || coord.z == self.counts.z - 1
    }

    /// True if any voxel of `voxels` touches the outer face of the grid.
    pub fn box_touches_border(&self, voxels: &VoxelBox) -> bool {
        self.is_border(voxels.min) || self.is_border(voxels.max)
    }

    #[inline]
    fn index(&self, coord: VoxelCoord) -> Option<usize> {
        self.contains(coord).then(|| {
            coord.x as usize
                + coord.y as usize * self.counts.x as usize
                + coord.z as usize * self.counts.x as usize * self.counts.y as usize
        })
    }

    /// Convert a world position to fractional voxel units.
    #[inline]
    pub fn to_grid(&self, point: Vec3) -> Vec3 {
        (point - self.mins) / self.voxel_size
    }

    /// Convert fractional voxel units back to a world position.
    #[inline]
    pub fn to_world(&self, grid: Vec3) -> Vec3 {
        self.mins + grid * self.voxel_size
    }

    /// Voxel containing `point`, or `None` outside the grid.
    pub fn get_voxel_coord(&self, point: Vec3) -> Option<VoxelCoord> {
        let g = self.to_grid(point).floor();
        if !g.is_finite() {
            return None;
        }
        let coord = VoxelCoord::from(g.as_ivec3());
        self.contains(coord).then_some(coord)
    }

    /// World bounds of a single voxel.
    pub fn get_voxel_bounds(&self, coord: VoxelCoord) -> Aabb {
        let min = self.to_world(coord.to_ivec3().as_vec3());
        Aabb::new(min, min + self.voxel_size)
    }

    /// World center of a single voxel.
    pub fn get_voxel_center(&self, coord: VoxelCoord) -> Vec3 {
        self.to_world(coord.to_ivec3().as_vec3() + Vec3::splat(0.5))
    }

    /// World bounds of an inclusive voxel box.
    pub fn get_box_bounds(&self, voxels: &VoxelBox) -> Aabb {
        Aabb::new(
            self.to_world(voxels.min.to_ivec3().as_vec3()),
            self.to_world((voxels.max.to_ivec3() + IVec3::ONE).as_vec3()),
        )
    }

    /// The voxels overlapping a world box, clamped to the grid.
    pub fn get_voxel_bounds_within(&self, bounds: &Aabb) -> Option<VoxelBox> {
        let lo = self.to_grid(bounds.min).floor().as_ivec3().max(IVec3::ZERO);
        let hi = self
            .to_grid(bounds.max)
            .floor()
            .as_ivec3()
            .min(self.counts - IVec3::ONE);
        lo.cmple(hi).all().then(|| VoxelBox::new(lo.into(), hi.into()))
    }

    /// Split the grid into tiles of at most `tile_size` voxels per axis.
    pub fn tiles(&self, tile_size: IVec3) -> Vec<VoxelBox> {
        let tile_size = tile_size.max(IVec3::ONE);
        let tiles = (self.counts + tile_size - IVec3::ONE) / tile_size;
        let mut out = Vec::with_capacity((tiles.x * tiles.y * tiles.z) as usize);
        for tz in 0..tiles.z {
            for ty in 0..tiles.y {
                for tx in 0..tiles.x {
                    let min = IVec3::new(tx, ty, tz) * tile_size;
                    let max = (min + tile_size - IVec3::ONE).min(self.counts - IVec3::ONE);
                    out.push(VoxelBox::new(min.into(), max.into()));
                }
            }
        }
        out
    }

    /// The voxels a visibility-blocking triangle makes solid.
    ///
    /// A voxel is claimed if the triangle overlaps it and the voxel is not
    /// sitting entirely in front of the triangle's plane. This keeps the
    /// voxel on the open side of a wall empty.
    pub fn voxelize_triangle(&self, triangle: &[Vec3; 3]) -> Vec<VoxelCoord> {
        let Some(plane) = Plane::from_points(triangle[0], triangle[1], triangle[2]) else {
            return Vec::new();
        };
        let bias = plane.normal * (-SURFACE_BIAS * self.voxel_size.min_element());
        let biased = triangle.map(|p| p + bias);

        let bounds = Aabb::from_points(biased).inflated(self.voxel_size * VOXEL_SHRINK);
        let Some(range) = self.get_voxel_bounds_within(&bounds) else {
            return Vec::new();
        };

        let half = self.voxel_size * 0.5;
        let shrunk_half = half * (1.0 - VOXEL_SHRINK);
        let projected_half = half.dot(plane.normal.abs());
        let front_epsilon = projected_half * 1e-3;

        range
            .iter()
            .filter(|coord| {
                let center = self.get_voxel_center(*coord);
                if plane.distance(center) >= projected_half - front_epsilon {
                    return false;
                }
                triangle_box_overlap(center, shrunk_half, &biased)
            })
            .collect()
    }
}

/// A voxel grid over the scene with per-voxel occupancy.
#[derive(Clone, Debug)]
pub struct VoxelSpace {
    grid: VoxelGrid,
    voxels: Vec<VoxelType>,
    octree: VoxelOctree<VoxelType>,
    solid_count: usize,
}

impl VoxelSpace {
    /// Create an all-empty space covering `scene_bounds` padded by one voxel.
    pub fn new(scene_bounds: Aabb, voxel_size: Vec3) -> Result<Self> {
        let grid = VoxelGrid::new(scene_bounds, voxel_size)?;
        let counts = grid.counts();
        Ok(Self {
            grid,
            voxels: vec![VoxelType::Empty; grid.voxel_count()],
            octree: VoxelOctree::covering([counts.x as u32, counts.y as u32, counts.z as u32]),
            solid_count: 0,
        })
    }

    /// Grid placement, detached from the voxel data.
    #[inline]
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// Number of voxels along each axis.
    #[inline]
    pub fn counts(&self) -> IVec3 {
        self.grid.counts()
    }

    /// Number of solid voxels.
    #[inline]
    pub fn solid_count(&self) -> usize {
        self.solid_count
    }

    /// Number of empty voxels.
    #[inline]
    pub fn empty_count(&self) -> usize {
        self.voxels.len() - self.solid_count
    }

    /// Octree mirroring the solid voxels, in voxel units.
    pub fn octree(&self) -> &VoxelOctree<VoxelType> {
        &self.octree
    }

    /// See [`VoxelGrid::get_voxel_coord`].
    pub fn get_voxel_coord(&self, point: Vec3) -> Option<VoxelCoord> {
        self.grid.get_voxel_coord(point)
    }

    /// See [`VoxelGrid::get_voxel_bounds`].
    pub fn get_voxel_bounds(&self, coord: VoxelCoord) -> Aabb {
        self.grid.get_voxel_bounds(coord)
    }

    /// See [`VoxelGrid::get_voxel_center`].
    pub fn get_voxel_center(&self, coord: VoxelCoord) -> Vec3 {
        self.grid.get_voxel_center(coord)
    }

    /// See [`VoxelGrid::get_voxel_bounds_within`].
    pub fn get_voxel_bounds_within(&self, bounds: &Aabb) -> Option<VoxelBox> {
        self.grid.get_voxel_bounds_within(bounds)
    }

    /// Occupancy of a voxel; `None` outside the grid.
    #[inline]
    pub fn get_voxel_type(&self, coord: VoxelCoord) -> Option<VoxelType> {
        self.grid.index(coord).map(|i| self.voxels[i])
    }

    /// True for an empty voxel inside the grid.
    #[inline]
    pub fn is_empty_voxel(&self, coord: VoxelCoord) -> bool {
        self.get_voxel_type(coord) == Some(VoxelType::Empty)
    }

    /// Visit every voxel in scan order.
    pub fn for_each_voxel(&self, mut f: impl FnMut(VoxelCoord, VoxelType)) {
        for (coord, voxel) in self.grid.grid_box().iter().zip(&self.voxels) {
            f(coord, *voxel);
        }
    }

    /// Change a voxel's occupancy. Out of range coordinates are an error.
    pub fn set_voxel_type(&mut self, coord: VoxelCoord, voxel_type: VoxelType) -> Result<()> {
        let index = self
            .grid
            .index(coord)
            .ok_or_else(|| Error::OutOfBounds(format!("voxel {coord:?} outside grid")))?;
        let old = std::mem::replace(&mut self.voxels[index], voxel_type);
        match (old, voxel_type) {
            (VoxelType::Empty, VoxelType::Solid) => {
                self.solid_count += 1;
                self.octree.insert(coord, VoxelType::Solid);
            }
            (VoxelType::Solid, VoxelType::Empty) => {
                self.solid_count -= 1;
                self.octree.remove(coord);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Separating-axis overlap test between a triangle and an axis-aligned box.
pub fn triangle_box_overlap(center: Vec3, half: Vec3, triangle: &[Vec3; 3]) -> bool {
    let v0 = triangle[0] - center;
    let v1 = triangle[1] - center;
    let v2 = triangle[2] - center;
    let edges = [v1 - v0, v2 - v1, v0 - v2];

    // 9 cross-product axes.
    for edge in edges {
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            let a = axis.cross(edge);
            if a.length_squared() < 1e-12 {
                continue;
            }
            let p0 = a.dot(v0);
            let p1 = a.dot(v1);
            let p2 = a.dot(v2);
            let r = half.dot(a.abs());
            if p0.min(p1).min(p2) > r || p0.max(p1).max(p2) < -r {
                return false;
            }
        }
    }

    // Box face normals.
    let tri_min = v0.min(v1).min(v2);
    let tri_max = v0.max(v1).max(v2);
    if tri_min.cmpgt(half).any() || tri_max.cmplt(-half).any() {
        return false;
    }

    // Triangle normal.
    let normal = edges[0].cross(edges[1]);
    let d = normal.dot(v0);
    let r = half.dot(normal.abs());
    d.abs() <= r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn space() -> VoxelSpace {
        VoxelSpace::new(Aabb::new(Vec3::ZERO, Vec3::splat(10.0)), Vec3::ONE).unwrap()
    }

    #[test]
    fn grid_is_padded_by_one_voxel() {
        let space = space();
        assert_eq!(space.counts(), IVec3::splat(12));
        assert_eq!(space.grid().mins(), Vec3::splat(-1.0));
        assert_eq!(space.empty_count(), 12 * 12 * 12);
    }

    #[test]
    fn voxel_center_round_trips() {
        let space = VoxelSpace::new(
            Aabb::new(Vec3::new(-3.0, 0.5, 2.0), Vec3::new(4.0, 6.0, 5.5)),
            Vec3::new(0.5, 1.0, 0.75),
        )
        .unwrap();
        for coord in space.grid().grid_box().iter() {
            assert_eq!(space.get_voxel_coord(space.get_voxel_center(coord)), Some(coord));
        }
    }

    #[test]
    fn voxel_bounds_follow_voxel_size() {
        let space = VoxelSpace::new(
            Aabb::new(Vec3::new(-3.0, 0.5, 2.0), Vec3::new(4.0, 6.0, 5.5)),
            Vec3::new(0.5, 1.0, 0.75),
        )
        .unwrap();
        let first = space.get_voxel_bounds(VoxelCoord::new(0, 0, 0));
        assert_relative_eq!(first.min.x, -3.5);
        assert_relative_eq!(first.min.y, -0.5);
        assert_relative_eq!(first.min.z, 1.25);
        assert_relative_eq!(first.size().z, 0.75);

        let coord = VoxelCoord::new(4, 2, 3);
        let center = space.get_voxel_center(coord);
        let bounds = space.get_voxel_bounds(coord);
        assert_relative_eq!(center.x, bounds.center().x, epsilon = 1e-5);
        assert_relative_eq!(center.y, bounds.center().y, epsilon = 1e-5);
        assert_relative_eq!(center.z, bounds.center().z, epsilon = 1e-5);
    }

    #[test]
    fn for_each_voxel_matches_lookups() {
        let mut space = space();
        let solid = VoxelCoord::new(3, 4, 5);
        space.set_voxel_type(solid, VoxelType::Solid).unwrap();
        let mut seen = 0;
        space.for_each_voxel(|c, t| {
            assert_eq!(space.get_voxel_type(c), Some(t));
            seen += 1;
        });
        assert_eq!(seen, space.grid().voxel_count());
        assert_eq!(space.solid_count(), 1);
    }

    #[test]
    fn outside_points_have_no_voxel() {
        let space = space();
        assert_eq!(space.get_voxel_coord(Vec3::splat(-1.5)), None);
        assert_eq!(space.get_voxel_coord(Vec3::splat(11.5)), None);
        assert_eq!(
            space.get_voxel_coord(Vec3::splat(0.5)),
            Some(VoxelCoord::new(1, 1, 1))
        );
    }

    #[test]
    fn bounds_within_clamps_to_grid() {
        let space = space();
        let range = space
            .get_voxel_bounds_within(&Aabb::new(Vec3::splat(-50.0), Vec3::new(0.5, 0.5, 0.5)))
            .unwrap();
        assert_eq!(range.min, VoxelCoord::new(0, 0, 0));
        assert_eq!(range.max, VoxelCoord::new(1, 1, 1));
        assert!(space
            .get_voxel_bounds_within(&Aabb::new(Vec3::splat(50.0), Vec3::splat(60.0)))
            .is_none());
    }

    #[test]
    fn set_voxel_type_tracks_octree() {
        let mut space = space();
        let c = VoxelCoord::new(3, 4, 5);
        space.set_voxel_type(c, VoxelType::Solid).unwrap();
        space.set_voxel_type(c, VoxelType::Solid).unwrap();
        assert_eq!(space.solid_count(), 1);
        assert_eq!(space.octree().get(c), Some(VoxelType::Solid));
        space.set_voxel_type(c, VoxelType::Empty).unwrap();
        assert!(space.octree().is_empty());
        assert!(space
            .set_voxel_type(VoxelCoord::new(12, 0, 0), VoxelType::Solid)
            .is_err());
    }

    #[test]
    fn wall_claims_the_voxel_behind_it() {
        let space = space();
        // A wall on the plane x = 5 facing +X.
        let tri = [
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(5.0, 10.0, 0.0),
            Vec3::new(5.0, 0.0, 10.0),
        ];
        let plane = Plane::from_points(tri[0], tri[1], tri[2]).unwrap();
        assert_relative_eq!(plane.normal.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(plane.dist, 5.0, epsilon = 1e-5);

        let voxels = space.grid().voxelize_triangle(&tri);
        assert!(!voxels.is_empty());
        // Grid x index 5 covers world [4, 5]; that is behind the wall.
        assert!(voxels.iter().all(|c| c.x == 5));
        assert!(voxels.contains(&VoxelCoord::new(5, 1, 1)));
        // Voxels past the triangle's edges are not claimed.
        assert!(!voxels.contains(&VoxelCoord::new(5, 11, 1)));
    }

    #[test]
    fn tiles_cover_the_grid() {
        let space = space();
        let tiles = space.grid().tiles(IVec3::splat(5));
        assert_eq!(tiles.len(), 27);
        let total: usize = tiles.iter().map(VoxelBox::volume).sum();
        assert_eq!(total, space.grid().voxel_count());
    }

    #[test]
    fn sat_overlap() {
        let tri = [
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        assert!(triangle_box_overlap(Vec3::ZERO, Vec3::splat(0.5), &tri));
        assert!(!triangle_box_overlap(Vec3::new(0.0, 2.0, 0.0), Vec3::splat(0.5), &tri));
        assert!(!triangle_box_overlap(Vec3::new(3.0, 0.0, 2.0), Vec3::splat(0.5), &tri));
    }
}
