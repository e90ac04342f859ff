//! Visibility build demo.
//!
//! Builds a small level of rooms with the voxel and BSP pipelines and logs
//! what each produced.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p visbake-demo -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use anyhow::{bail, Context};
use glam::Vec3;
use tracing::info;
use tracing_subscriber::EnvFilter;
use visbake_vis::{
    build_vis, BuildContext, MapBuildOptions, MapEntity, MapFile, MapScene, MeshGroup, VisMode,
    VisOutput,
};

struct Args {
    modes: Vec<VisMode>,
    options: MapBuildOptions,
    sealed: bool,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args {
        modes: vec![VisMode::Voxel, VisMode::Bsp],
        options: MapBuildOptions::default(),
        sealed: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("{name} needs a value"));
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--mode" => {
                args.modes = match value("--mode")?.as_str() {
                    "voxel" => vec![VisMode::Voxel],
                    "bsp" => vec![VisMode::Bsp],
                    "both" => vec![VisMode::Voxel, VisMode::Bsp],
                    other => bail!("unknown mode {other:?}"),
                }
            }
            "--voxel-size" => {
                args.options.voxel_size = Vec3::splat(value("--voxel-size")?.parse()?);
            }
            "--samples" => args.options.cluster_merge_samples = value("--samples")?.parse()?,
            "--seed" => args.options.random_seed = value("--seed")?.parse()?,
            "--threads" => args.options.threads = value("--threads")?.parse()?,
            "--sealed" => args.sealed = true,
            "--progress" => args.options.show_progress = true,
            other => bail!("unknown argument {other:?}, try --help"),
        }
    }
    Ok(Some(args))
}

/// Two 10-unit rooms side by side, joined by a doorway unless `sealed`.
fn sample_level(sealed: bool) -> (MapScene, MapFile) {
    let mut scene = MapScene::new();
    for axis in 0..3 {
        let mut min = Vec3::splat(-1.0);
        let mut max = Vec3::new(22.0, 11.0, 11.0);
        let far = max[axis] - 1.0;
        max[axis] = 0.0;
        scene.add_box_brush(min, max);
        min[axis] = far;
        max[axis] = far + 1.0;
        scene.add_box_brush(min, max);
    }
    if sealed {
        scene.add_box_brush(Vec3::new(10.0, 0.0, 0.0), Vec3::new(11.0, 10.0, 10.0));
    } else {
        scene.add_box_brush(Vec3::new(10.0, 0.0, 0.0), Vec3::new(11.0, 4.0, 10.0));
        scene.add_box_brush(Vec3::new(10.0, 6.0, 0.0), Vec3::new(11.0, 10.0, 10.0));
        scene.add_box_brush(Vec3::new(10.0, 4.0, 3.0), Vec3::new(11.0, 6.0, 10.0));
    }

    let floor = |x0: f32, x1: f32| {
        visbake_core::Winding::axial_rect(
            2,
            0.01,
            Vec3::new(x0, 0.0, 0.0),
            Vec3::new(x1, 10.0, 0.0),
            true,
        )
    };
    scene.mesh_groups.push(MeshGroup {
        name: "west_floor".to_owned(),
        polygons: floor(0.0, 10.0).into_iter().collect(),
    });
    scene.mesh_groups.push(MeshGroup {
        name: "east_floor".to_owned(),
        polygons: floor(11.0, 21.0).into_iter().collect(),
    });

    let map = MapFile {
        entities: vec![
            MapEntity::new("worldspawn"),
            MapEntity::at("info_player_start", Vec3::new(3.0, 5.0, 2.0)),
        ],
    };
    (scene, map)
}

fn report(mode: VisMode, out: &VisOutput) {
    let visible: usize = out.regions.iter().map(|r| r.visible.count_ones()).sum();
    let average = visible as f32 / out.regions.len().max(1) as f32;
    info!(
        ?mode,
        regions = out.regions.len(),
        pruned = out.stats.regions_before_prune - out.stats.regions,
        portals = out.stats.portals,
        average_visible = average,
        leaked = out.leaked,
        "build finished"
    );
    for (name, point) in [
        ("west room", Vec3::new(3.0, 5.0, 2.0)),
        ("east room", Vec3::new(18.0, 5.0, 2.0)),
    ] {
        match out.find_region(point) {
            Some(region) => info!(
                ?mode,
                name,
                region,
                sees = out.regions[region as usize].visible.count_ones(),
                mesh_groups = out.regions[region as usize].mesh_groups.count_ones(),
                "lookup"
            ),
            None => info!(?mode, name, "lookup: solid or pruned"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(args) = parse_args()? else {
        print_help();
        return Ok(());
    };
    args.options.validate()?;
    let ctx = BuildContext::new(args.options.threads)?;
    info!(threads = ctx.threads(), sealed = args.sealed, "visbake demo");

    let (scene, map) = sample_level(args.sealed);
    for mode in args.modes {
        let options = MapBuildOptions {
            vis_mode: mode,
            ..args.options.clone()
        };
        let out = build_vis(&ctx, &options, &scene, &map)
            .with_context(|| format!("{mode:?} build failed"))?;
        report(mode, &out);
    }
    Ok(())
}

fn print_help() {
    eprintln!(
        "Visibility build demo

USAGE:
    cargo run -p visbake-demo -- [OPTIONS]

OPTIONS:
    --mode <voxel|bsp|both>  Pipelines to run (default: both)
    --voxel-size <N>         Voxel edge length (default: 1)
    --samples <N>            Rays per cluster merge test (default: 5000)
    --seed <N>               Merge sampling seed (default: 0)
    --threads <N>            Worker threads, 0 for all cores (default: 0)
    --sealed                 Close the doorway between the rooms
    --progress               Log progress of long phases
    -h, --help               Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                 Set log level (e.g., info, debug, trace)"
    );
}
