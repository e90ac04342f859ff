//! Core types and geometric primitives for the visbake visibility compilers.
//!
//! This crate provides the foundational types used by both pipelines:
//! - Axis-aligned boxes
//! - Planes and convex windings with clipping
//! - Voxel coordinates and integer voxel boxes
//! - Fixed-width bit vectors used for visibility sets
//! - Common error types

pub mod bits;
pub mod coords;
pub mod error;
pub mod math;
pub mod plane;
pub mod winding;

pub use bits::BitVec;
pub use coords::{Axis, Direction, VoxelBox, VoxelCoord};
pub use error::{Error, Result};
pub use math::Aabb;
pub use plane::{Plane, PlaneSide};
pub use winding::{Split, Winding, WindingSide};

/// Build-wide geometric constants
pub mod constants {
    /// Maximum number of points a winding may hold.
    pub const MAX_WINDING_POINTS: usize = 64;
    /// Distance within which a point is considered on a plane.
    pub const ON_EPSILON: f32 = 0.01;
    /// Epsilon used when splitting windings with a dead zone.
    pub const SPLIT_WINDING_EPSILON: f32 = 0.001;
    /// Windings with less than this edge length are considered degenerate.
    pub const EDGE_LENGTH: f32 = 0.02;
    /// Half-size of the quad generated by `Winding::base_for_plane`.
    pub const MAX_WORLD_COORD: f32 = 8192.0;
}
