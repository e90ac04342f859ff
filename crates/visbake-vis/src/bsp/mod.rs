//! Solid-leaf BSP pipeline.
//!
//! Occluder polygons partition space into convex leaves. Leaves inside
//! structural solids, and leaves no entity can reach, become opaque; the
//! remaining leaves are the regions the shared portal flow runs over.

mod builder;
mod face;
mod output;
mod portals;
mod tree;

pub use builder::{FloodOutcome, LeafGraph, VisBuilderBsp};
pub use face::{collect_faces, BspFace};
pub use output::{build_output_tree, BspTree, BspTreeNode, OPAQUE_LEAF};
pub use portals::{BspPortal, BSP_SIDE_SPACE};
pub use tree::{pick_best_split, BspArena, BspNode};
