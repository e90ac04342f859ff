//! Voxel grids and spatial indices for the visbake visibility compilers.
//!
//! - [`VoxelSpace`]: the padded voxel grid and triangle voxelization
//! - [`VoxelOctree`]: sparse index of solid voxels
//! - [`AabbTree`]: static box tree used for region lookup
//! - [`OcclusionTracer`]: boolean line-of-sight queries

pub mod aabb_tree;
pub mod octree;
pub mod space;
pub mod trace;

pub use aabb_tree::{AabbNode, AabbTree};
pub use octree::{OctreeNode, VoxelOctree};
pub use space::{triangle_box_overlap, VoxelGrid, VoxelSpace, VoxelType};
pub use trace::{OcclusionTracer, VoxelTracer};
