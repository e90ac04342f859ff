//! Build options.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use visbake_core::{Error, Result};

/// Which visibility pipeline to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisMode {
    /// Voxelize the scene and cluster empty space.
    #[default]
    Voxel,
    /// Build a solid-leaf BSP from occluder polygons.
    Bsp,
}

/// Options controlling a visibility build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapBuildOptions {
    /// Pipeline selector.
    pub vis_mode: VisMode,
    /// World size of one voxel.
    pub voxel_size: Vec3,
    /// Voxels per tile for parallel area growth.
    pub tile_size: IVec3,
    /// Largest world extent a cluster may reach on any axis.
    pub max_cluster_size: Vec3,
    /// Rays cast per cluster merge test.
    pub cluster_merge_samples: u32,
    /// Largest `occluded fraction × outward portal area` a merge may have.
    pub cluster_occlusion_threshold: f32,
    /// Seed for merge-test sampling.
    pub random_seed: u64,
    /// Worker threads; 0 uses every core.
    pub threads: usize,
    /// Log progress of long phases.
    pub show_progress: bool,
}

impl Default for MapBuildOptions {
    fn default() -> Self {
        Self {
            vis_mode: VisMode::Voxel,
            voxel_size: Vec3::splat(1.0),
            tile_size: IVec3::splat(32),
            max_cluster_size: Vec3::splat(64.0),
            cluster_merge_samples: 5000,
            cluster_occlusion_threshold: 1.0,
            random_seed: 0,
            threads: 0,
            show_progress: false,
        }
    }
}

impl MapBuildOptions {
    /// Options for the BSP pipeline.
    pub fn bsp() -> Self {
        Self {
            vis_mode: VisMode::Bsp,
            ..Default::default()
        }
    }

    /// Reject option combinations no build can run with.
    pub fn validate(&self) -> Result<()> {
        if !self.voxel_size.is_finite() || self.voxel_size.min_element() <= 0.0 {
            return Err(Error::InvalidOptions(format!(
                "voxel_size must be positive, got {}",
                self.voxel_size
            )));
        }
        if self.tile_size.min_element() <= 0 {
            return Err(Error::InvalidOptions(format!(
                "tile_size must be positive, got {}",
                self.tile_size
            )));
        }
        if self.max_cluster_size.is_nan() || self.max_cluster_size.min_element() <= 0.0 {
            return Err(Error::InvalidOptions(format!(
                "max_cluster_size must be positive, got {}",
                self.max_cluster_size
            )));
        }
        if self.cluster_occlusion_threshold.is_nan() || self.cluster_occlusion_threshold < 0.0 {
            return Err(Error::InvalidOptions(format!(
                "cluster_occlusion_threshold must not be negative, got {}",
                self.cluster_occlusion_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        MapBuildOptions::default().validate().unwrap();
        assert_eq!(MapBuildOptions::bsp().vis_mode, VisMode::Bsp);
    }

    #[test]
    fn bad_sizes_are_rejected() {
        let options = MapBuildOptions {
            voxel_size: Vec3::new(1.0, 0.0, 1.0),
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));

        let options = MapBuildOptions {
            tile_size: IVec3::new(8, -1, 8),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = MapBuildOptions {
            cluster_occlusion_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
