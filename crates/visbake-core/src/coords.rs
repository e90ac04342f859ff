//! Integer voxel coordinates and boxes.

use bytemuck::{Pod, Zeroable};
use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Position of a voxel in grid coordinates.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable, Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct VoxelCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelCoord {
    /// Create a new voxel coordinate
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Component along `axis`.
    #[inline]
    pub const fn get(self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Copy with the component along `axis` replaced.
    #[inline]
    pub const fn with(self, axis: Axis, value: i32) -> Self {
        match axis {
            Axis::X => Self::new(value, self.y, self.z),
            Axis::Y => Self::new(self.x, value, self.z),
            Axis::Z => Self::new(self.x, self.y, value),
        }
    }

    /// The neighboring voxel one step in `dir`.
    #[inline]
    pub fn step(self, dir: Direction) -> Self {
        Self::from(self.to_ivec3() + dir.offset())
    }

    /// Convert to glam IVec3
    #[inline]
    pub const fn to_ivec3(self) -> IVec3 {
        IVec3::new(self.x, self.y, self.z)
    }
}

impl From<IVec3> for VoxelCoord {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// A world axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All three axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// 0 for X, 1 for Y, 2 for Z.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// One of the six axis directions.
///
/// The declaration order is the order in which boxes are grown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// +Z
    Front,
    /// -Z
    Back,
    /// +X
    Right,
    /// -X
    Left,
    /// +Y
    Up,
    /// -Y
    Down,
}

impl Direction {
    /// All directions in growth order.
    pub const ALL: [Direction; 6] = [
        Direction::Front,
        Direction::Back,
        Direction::Right,
        Direction::Left,
        Direction::Up,
        Direction::Down,
    ];

    /// Axis the direction runs along.
    #[inline]
    pub const fn axis(self) -> Axis {
        match self {
            Direction::Front | Direction::Back => Axis::Z,
            Direction::Right | Direction::Left => Axis::X,
            Direction::Up | Direction::Down => Axis::Y,
        }
    }

    /// True for the +X, +Y, +Z directions.
    #[inline]
    pub const fn is_positive(self) -> bool {
        matches!(self, Direction::Front | Direction::Right | Direction::Up)
    }

    /// Unit offset.
    #[inline]
    pub fn offset(self) -> IVec3 {
        let mut v = IVec3::ZERO;
        v[self.axis().index()] = if self.is_positive() { 1 } else { -1 };
        v
    }

    /// The opposite direction.
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Front => Direction::Back,
            Direction::Back => Direction::Front,
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// An inclusive box of voxels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelBox {
    pub min: VoxelCoord,
    pub max: VoxelCoord,
}

impl VoxelBox {
    /// Create a box from inclusive corners.
    #[inline]
    pub const fn new(min: VoxelCoord, max: VoxelCoord) -> Self {
        Self { min, max }
    }

    /// A box holding exactly one voxel.
    #[inline]
    pub const fn single(coord: VoxelCoord) -> Self {
        Self {
            min: coord,
            max: coord,
        }
    }

    /// Number of voxels along each axis.
    #[inline]
    pub fn extent(&self) -> IVec3 {
        self.max.to_ivec3() - self.min.to_ivec3() + IVec3::ONE
    }

    /// Number of voxels in the box.
    #[inline]
    pub fn volume(&self) -> usize {
        let e = self.extent();
        (e.x.max(0) as usize) * (e.y.max(0) as usize) * (e.z.max(0) as usize)
    }

    /// True if `coord` lies in the box.
    #[inline]
    pub fn contains(&self, coord: VoxelCoord) -> bool {
        coord.x >= self.min.x
            && coord.x <= self.max.x
            && coord.y >= self.min.y
            && coord.y <= self.max.y
            && coord.z >= self.min.z
            && coord.z <= self.max.z
    }

    /// True if `other` lies completely inside this box.
    #[inline]
    pub fn contains_box(&self, other: &VoxelBox) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Overlapping part of two boxes, if any.
    pub fn intersection(&self, other: &VoxelBox) -> Option<VoxelBox> {
        let min = self.min.to_ivec3().max(other.min.to_ivec3());
        let max = self.max.to_ivec3().min(other.max.to_ivec3());
        if min.cmple(max).all() {
            Some(VoxelBox::new(min.into(), max.into()))
        } else {
            None
        }
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &VoxelBox) -> VoxelBox {
        VoxelBox::new(
            self.min.to_ivec3().min(other.min.to_ivec3()).into(),
            self.max.to_ivec3().max(other.max.to_ivec3()).into(),
        )
    }

    /// The one-voxel-thick layer just outside the face in `dir`.
    pub fn face_layer(&self, dir: Direction) -> VoxelBox {
        let axis = dir.axis();
        let plane = if dir.is_positive() {
            self.max.get(axis) + 1
        } else {
            self.min.get(axis) - 1
        };
        VoxelBox::new(self.min.with(axis, plane), self.max.with(axis, plane))
    }

    /// The box grown by one layer in `dir`.
    pub fn extended(&self, dir: Direction) -> VoxelBox {
        let axis = dir.axis();
        if dir.is_positive() {
            VoxelBox::new(self.min, self.max.with(axis, self.max.get(axis) + 1))
        } else {
            VoxelBox::new(self.min.with(axis, self.min.get(axis) - 1), self.max)
        }
    }

    /// Iterate every voxel, x fastest, then y, then z.
    pub fn iter(&self) -> impl Iterator<Item = VoxelCoord> {
        let (min, max) = (self.min, self.max);
        (min.z..=max.z).flat_map(move |z| {
            (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| VoxelCoord::new(x, y, z)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_volume_and_iteration_agree() {
        let b = VoxelBox::new(VoxelCoord::new(1, 2, 3), VoxelCoord::new(3, 2, 4));
        assert_eq!(b.volume(), 6);
        let all: Vec<_> = b.iter().collect();
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], VoxelCoord::new(1, 2, 3));
        assert_eq!(all[1], VoxelCoord::new(2, 2, 3));
        assert!(all.iter().all(|c| b.contains(*c)));
    }

    #[test]
    fn face_layer_and_extension() {
        let b = VoxelBox::new(VoxelCoord::new(0, 0, 0), VoxelCoord::new(1, 1, 1));
        let layer = b.face_layer(Direction::Right);
        assert_eq!(layer.min, VoxelCoord::new(2, 0, 0));
        assert_eq!(layer.max, VoxelCoord::new(2, 1, 1));
        let grown = b.extended(Direction::Down);
        assert_eq!(grown.min, VoxelCoord::new(0, -1, 0));
        assert_eq!(grown.volume(), 12);
        assert!(grown.contains_box(&b));
    }

    #[test]
    fn directions_are_consistent() {
        for dir in Direction::ALL {
            assert_eq!(dir.offset() + dir.opposite().offset(), IVec3::ZERO);
            let c = VoxelCoord::new(5, 5, 5);
            assert_eq!(c.step(dir).step(dir.opposite()), c);
        }
    }

    #[test]
    fn intersection_of_disjoint_boxes_is_none() {
        let a = VoxelBox::new(VoxelCoord::new(0, 0, 0), VoxelCoord::new(1, 1, 1));
        let b = VoxelBox::new(VoxelCoord::new(2, 0, 0), VoxelCoord::new(3, 1, 1));
        assert!(a.intersection(&b).is_none());
        assert_eq!(a.union(&b).volume(), 16);
    }
}
