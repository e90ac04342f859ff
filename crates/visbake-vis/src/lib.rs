//! Potentially-visible-set compilers for static levels.
//!
//! Two pipelines produce the same [`VisOutput`]:
//! - [`VisBuilder`] voxelizes the scene, grows boxes of empty space, and
//!   merges them into clusters.
//! - [`VisBuilderBsp`] partitions space with the occluder polygons and
//!   uses the open BSP leaves.
//!
//! Both hand their regions to the shared portal flow in [`flow`].

pub mod area;
pub mod bsp;
pub mod builder;
pub mod cluster;
pub mod context;
pub mod flow;
pub mod options;
pub mod output;
pub mod portal;
pub mod scene;

pub use bsp::{BspTree, BspTreeNode, VisBuilderBsp};
pub use builder::{build_vis, VisBuilder};
pub use cluster::{AreaCluster, ClusterGraph};
pub use context::BuildContext;
pub use flow::{compute_pvs, PortalGraph, PvsResult};
pub use options::{MapBuildOptions, VisMode};
pub use output::{BuildStats, PvsRecord, SpatialIndex, VisOutput};
pub use portal::Portal;
pub use scene::{BspSolid, HintPolygon, MapEntity, MapFile, MapMesh, MapScene, MeshGroup};
