//! Full visibility builds of a small grid of rooms.
//!
//! Run with: cargo bench --package visbake-vis --bench build

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use visbake_vis::{build_vis, BuildContext, MapBuildOptions, VisMode};

#[path = "../tests/common/mod.rs"]
mod common;

use common::{players, room_grid, GRID_START};

fn benchmark_builds(c: &mut Criterion) {
    let scene = room_grid(3);
    let map = players(&[GRID_START]);
    let ctx = BuildContext::new(0).unwrap();

    let mut group = c.benchmark_group("vis_build");
    group.sample_size(10);
    for mode in [VisMode::Voxel, VisMode::Bsp] {
        let options = MapBuildOptions {
            vis_mode: mode,
            cluster_merge_samples: 1000,
            ..Default::default()
        };
        group.bench_function(format!("{mode:?}_3x3_rooms"), |b| {
            b.iter(|| black_box(build_vis(&ctx, &options, &scene, &map).unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_builds);
criterion_main!(benches);
