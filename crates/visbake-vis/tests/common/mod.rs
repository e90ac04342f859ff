//! Shared test levels.
//!
//! Two rooms inside a shell of walls one unit thick. The interior spans
//! `[0, 10]` on every axis; a wall at `x ∈ [5, 6]` splits it into room A
//! (`x < 5`) and room B (`x > 6`).

#![allow(dead_code)]

use glam::Vec3;
use visbake_vis::{MapBuildOptions, MapEntity, MapFile, MapScene, VisMode};

/// A point in room A that sees straight through the doorway.
pub const ROOM_A: Vec3 = Vec3::new(2.3, 4.7, 0.8);
/// The matching point in room B.
pub const ROOM_B: Vec3 = Vec3::new(8.3, 4.7, 0.8);

fn shell(scene: &mut MapScene, skip_top: bool) {
    for axis in 0..3 {
        let mut min = Vec3::splat(-1.0);
        let mut max = Vec3::splat(11.0);
        max[axis] = 0.0;
        scene.add_box_brush(min, max);
        if skip_top && axis == 2 {
            continue;
        }
        min[axis] = 10.0;
        max[axis] = 11.0;
        scene.add_box_brush(min, max);
    }
}

fn dividing_wall(scene: &mut MapScene, door: bool) {
    if door {
        // Doorway at y ∈ [4, 6), z ∈ [0, 2).
        scene.add_box_brush(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 4.0, 10.0));
        scene.add_box_brush(Vec3::new(5.0, 6.0, 0.0), Vec3::new(6.0, 10.0, 10.0));
        scene.add_box_brush(Vec3::new(5.0, 4.0, 2.0), Vec3::new(6.0, 6.0, 10.0));
    } else {
        scene.add_box_brush(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 10.0, 10.0));
    }
}

/// Two rooms, joined by a doorway when `door` is set.
pub fn two_rooms(door: bool) -> MapScene {
    let mut scene = MapScene::new();
    shell(&mut scene, false);
    dividing_wall(&mut scene, door);
    scene
}

/// The doorway level with its ceiling missing.
pub fn open_top_rooms() -> MapScene {
    let mut scene = MapScene::new();
    shell(&mut scene, true);
    dividing_wall(&mut scene, true);
    scene
}

/// `n × n` rooms of size 8 separated by walls with one doorway each way.
pub fn room_grid(n: usize) -> MapScene {
    let mut scene = MapScene::new();
    let size = 8.0;
    let extent = n as f32 * (size + 1.0) + 1.0;
    for axis in 0..3 {
        let mut min = Vec3::splat(0.0);
        let mut max = Vec3::new(extent, extent, size + 2.0);
        max[axis] = 1.0;
        scene.add_box_brush(min, max);
        min[axis] = [extent, extent, size + 2.0][axis] - 1.0;
        max[axis] = min[axis] + 1.0;
        scene.add_box_brush(min, max);
    }
    for i in 1..n {
        let at = i as f32 * (size + 1.0);
        // Walls across X and across Y, each with a doorway near the floor.
        for axis in 0..2 {
            let other = 1 - axis;
            let mut min = Vec3::new(0.0, 0.0, 1.0);
            let mut max = Vec3::new(extent, extent, size + 1.0);
            min[axis] = at;
            max[axis] = at + 1.0;
            for j in 0..n {
                let start = j as f32 * (size + 1.0) + 1.0;
                let (mut lo, mut hi) = (min, max);
                lo[other] = start;
                hi[other] = start + 3.0;
                scene.add_box_brush(lo, hi);
                lo[other] = start + 5.0;
                hi[other] = start + size;
                scene.add_box_brush(lo, hi);
                lo[other] = start + 3.0;
                hi[other] = start + 5.0;
                lo.z = 4.0;
                scene.add_box_brush(lo, hi);
            }
        }
    }
    scene
}

/// Player start in the first room of [`room_grid`].
pub const GRID_START: Vec3 = Vec3::new(4.0, 4.0, 3.0);

/// A map holding one player start at each point.
pub fn players(points: &[Vec3]) -> MapFile {
    MapFile {
        entities: points
            .iter()
            .map(|p| MapEntity::at("info_player_start", *p))
            .collect(),
    }
}

pub fn options(mode: VisMode) -> MapBuildOptions {
    MapBuildOptions {
        vis_mode: mode,
        cluster_merge_samples: 500,
        random_seed: 7,
        threads: 4,
        ..Default::default()
    }
}
