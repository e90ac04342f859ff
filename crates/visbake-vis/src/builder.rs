//! The voxel visibility pipeline.

use std::sync::OnceLock;

use parking_lot::Mutex;
use visbake_core::{BitVec, Error, Result, VoxelBox};
use visbake_voxel::{AabbTree, VoxelGrid, VoxelSpace, VoxelTracer, VoxelType};

use crate::area::{grow_boxes, Area, AreaLookup};
use crate::bsp::VisBuilderBsp;
use crate::cluster::{simplify_cluster, ClusterGraph, Clusterer};
use crate::context::BuildContext;
use crate::flow::compute_pvs;
use crate::options::{MapBuildOptions, VisMode};
use crate::output::{BuildStats, PvsRecord, SpatialIndex, VisOutput};
use crate::portal::{area_portals, Portal};
use crate::scene::{MapFile, MapScene};

/// Run whichever pipeline `options.vis_mode` selects.
pub fn build_vis(
    ctx: &BuildContext,
    options: &MapBuildOptions,
    scene: &MapScene,
    map: &MapFile,
) -> Result<VisOutput> {
    match options.vis_mode {
        VisMode::Voxel => VisBuilder::new(ctx, options)?.build(scene, map),
        VisMode::Bsp => VisBuilderBsp::new(ctx, options)?.build(scene, map),
    }
}

/// Builds cluster visibility from a voxelized scene.
pub struct VisBuilder<'a> {
    ctx: &'a BuildContext,
    options: &'a MapBuildOptions,
}

impl<'a> VisBuilder<'a> {
    pub fn new(ctx: &'a BuildContext, options: &'a MapBuildOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { ctx, options })
    }

    /// Run every phase of the voxel pipeline.
    #[tracing::instrument(name = "vis_build", skip_all)]
    pub fn build(&self, scene: &MapScene, map: &MapFile) -> Result<VisOutput> {
        let space = self.voxelize(scene)?;
        let grid = *space.grid();
        let mut stats = BuildStats {
            occluders: space.solid_count(),
            ..Default::default()
        };

        let mut areas = self.grow_areas(&space)?;
        stats.areas = areas.len();
        let portals = self.build_portals(&grid, &mut areas)?;

        let tracer = VoxelTracer::new(&space);
        let clusters = Clusterer::new(&grid, &tracer, self.options).cluster(&mut areas, &portals);
        let mut graph = ClusterGraph::new(&grid, clusters, &areas, &portals);
        drop(areas);
        stats.regions_before_prune = graph.clusters.len();

        let leaked = self.flood_and_prune(&mut graph, &grid, &space, map)?;
        self.simplify(&mut graph)?;

        let pvs = compute_pvs(self.ctx, &graph, self.options.show_progress)?;
        for (cluster, visible) in graph.clusters.iter_mut().zip(pvs.region_pvs) {
            cluster.pvs = visible;
        }
        stats.regions = graph.clusters.len();
        stats = stats.with_flow(&pvs.stats);

        let index = build_cluster_index(&grid, &graph)?;
        let mesh_groups = self.classify_mesh_groups(scene, &index, graph.clusters.len());

        let regions = graph
            .clusters
            .iter()
            .zip(mesh_groups)
            .map(|(cluster, groups)| PvsRecord {
                visible: cluster.pvs.clone(),
                mesh_groups: groups,
                bounds: grid.get_box_bounds(&cluster.bounds),
            })
            .collect();

        tracing::info!(
            areas = stats.areas,
            clusters = stats.regions,
            pruned = stats.regions_before_prune - stats.regions,
            leaked,
            "voxel vis done"
        );
        Ok(VisOutput {
            index: SpatialIndex::AabbTree(index),
            regions,
            leaked,
            visible_faces: None,
            stats,
        })
    }

    /// Mark every voxel a visibility-blocking triangle claims.
    #[tracing::instrument(skip_all)]
    pub fn voxelize(&self, scene: &MapScene) -> Result<VoxelSpace> {
        let bounds = scene.bounds();
        if !bounds.is_valid() {
            return Err(Error::InvalidData("scene has no geometry".to_owned()));
        }
        let space = VoxelSpace::new(bounds, self.options.voxel_size)?;
        let grid = *space.grid();
        let triangles = scene.occluder_triangles();
        let space = Mutex::new(space);

        self.ctx.try_run_on_individual(
            "voxelize",
            triangles.len(),
            self.options.show_progress,
            |t| {
                let coords = grid.voxelize_triangle(&triangles[t]);
                if coords.is_empty() {
                    return Ok(());
                }
                let mut space = space.lock();
                for coord in coords {
                    space.set_voxel_type(coord, VoxelType::Solid)?;
                }
                Ok(())
            },
        )?;

        let space = space.into_inner();
        tracing::info!(
            triangles = triangles.len(),
            counts = %space.counts(),
            solid = space.solid_count(),
            "voxelized"
        );
        Ok(space)
    }

    /// Cover the empty voxels with areas, one tile at a time.
    #[tracing::instrument(skip_all)]
    pub fn grow_areas(&self, space: &VoxelSpace) -> Result<Vec<Area>> {
        let tiles = space.grid().tiles(self.options.tile_size);
        let grown: Vec<OnceLock<Vec<VoxelBox>>> = tiles.iter().map(|_| OnceLock::new()).collect();

        self.ctx.try_run_on_individual(
            "grow_areas",
            tiles.len(),
            self.options.show_progress,
            |t| {
                let boxes = grow_boxes(&tiles[t], |c| space.is_empty_voxel(c))?;
                grown[t].get_or_init(|| boxes);
                Ok(())
            },
        )?;

        let areas: Vec<Area> = grown
            .into_iter()
            .flat_map(|cell| cell.into_inner().unwrap_or_default())
            .map(Area::new)
            .collect();
        tracing::info!(tiles = tiles.len(), areas = areas.len(), "areas grown");
        Ok(areas)
    }

    /// Generate every area's outgoing portals and record their ids.
    #[tracing::instrument(skip_all)]
    pub fn build_portals(&self, grid: &VoxelGrid, areas: &mut [Area]) -> Result<Vec<Portal>> {
        let lookup = AreaLookup::new(areas.iter().map(|a| &a.bounds).zip(0u32..))?;
        let per_area: Vec<OnceLock<Vec<Portal>>> = areas.iter().map(|_| OnceLock::new()).collect();
        {
            let areas = &*areas;
            self.ctx.run_on_individual(
                "area_portals",
                areas.len(),
                self.options.show_progress,
                |a| {
                    per_area[a].get_or_init(|| area_portals(grid, &lookup, areas, a as u32));
                },
            );
        }

        let mut portals = Vec::new();
        for (area, cell) in areas.iter_mut().zip(per_area) {
            for portal in cell.into_inner().unwrap_or_default() {
                area.portals.push(portals.len() as u32);
                portals.push(portal);
            }
        }
        tracing::info!(portals = portals.len(), "area portals built");
        Ok(portals)
    }

    /// Flood from the entities and drop every cluster they cannot reach.
    ///
    /// Returns true if the level leaked; a leaked level is left unpruned.
    #[tracing::instrument(skip_all)]
    pub fn flood_and_prune(
        &self,
        graph: &mut ClusterGraph,
        grid: &VoxelGrid,
        space: &VoxelSpace,
        map: &MapFile,
    ) -> Result<bool> {
        let lookup = graph.lookup()?;
        let origins = map.origins();
        let starts: Vec<u32> = origins
            .iter()
            .filter_map(|o| grid.get_voxel_coord(*o))
            .filter(|c| space.is_empty_voxel(*c))
            .filter_map(|c| lookup.at(c))
            .collect();

        if starts.is_empty() {
            tracing::warn!(
                entities = map.entities.len(),
                origins = origins.len(),
                "no entity in open space, vis will not be culled"
            );
            return Ok(true);
        }
        if graph.flood_occupied(&starts) {
            tracing::warn!("map leaked to the exterior, vis will not be culled");
            return Ok(true);
        }

        let removed = graph.retain_occupied();
        tracing::info!(removed, kept = graph.clusters.len(), "unreachable clusters pruned");
        Ok(false)
    }

    /// Cover each cluster with as few boxes as greedy growth finds.
    #[tracing::instrument(skip_all)]
    pub fn simplify(&self, graph: &mut ClusterGraph) -> Result<()> {
        let lookup = graph.lookup()?;
        let clusters = &graph.clusters;
        let simplified: Vec<OnceLock<Vec<VoxelBox>>> =
            clusters.iter().map(|_| OnceLock::new()).collect();

        self.ctx.try_run_on_individual(
            "simplify_clusters",
            clusters.len(),
            self.options.show_progress,
            |c| {
                let boxes = simplify_cluster(&clusters[c], &lookup)?;
                simplified[c].get_or_init(|| boxes);
                Ok(())
            },
        )?;

        let mut before = 0;
        let mut after = 0;
        for (cluster, cell) in graph.clusters.iter_mut().zip(simplified) {
            before += cluster.contained_areas.len();
            cluster.cluster_boxes = cell
                .into_inner()
                .unwrap_or_else(|| cluster.contained_areas.clone());
            after += cluster.cluster_boxes.len();
        }
        tracing::debug!(before, after, "cluster boxes simplified");
        Ok(())
    }

    /// Per region, the mesh groups with a polygon overlapping it.
    #[tracing::instrument(skip_all)]
    pub fn classify_mesh_groups(
        &self,
        scene: &MapScene,
        index: &AabbTree<u32>,
        regions: usize,
    ) -> Vec<BitVec> {
        let groups = &scene.mesh_groups;
        let hits: Vec<OnceLock<BitVec>> = groups.iter().map(|_| OnceLock::new()).collect();

        self.ctx.run_on_individual(
            "mesh_groups",
            groups.len(),
            self.options.show_progress,
            |g| {
                let mut touched = BitVec::new(regions);
                for polygon in &groups[g].polygons {
                    index.query_box(&polygon.bounds(), |_, region| {
                        touched.set(*region as usize);
                    });
                }
                hits[g].get_or_init(|| touched);
            },
        );

        transpose_groups(hits, regions)
    }
}

/// Turn per-group region sets into per-region group sets.
pub(crate) fn transpose_groups(hits: Vec<OnceLock<BitVec>>, regions: usize) -> Vec<BitVec> {
    let count = hits.len();
    let mut per_region = vec![BitVec::new(count); regions];
    for (g, cell) in hits.into_iter().enumerate() {
        let Some(touched) = cell.into_inner() else {
            continue;
        };
        for r in touched.iter_ones() {
            per_region[r].set(g);
        }
    }
    per_region
}

/// Runtime lookup from world point to cluster.
pub fn build_cluster_index(grid: &VoxelGrid, graph: &ClusterGraph) -> Result<AabbTree<u32>> {
    let leaves = graph
        .clusters
        .iter()
        .flat_map(|c| {
            c.cluster_boxes
                .iter()
                .map(move |b| (grid.get_box_bounds(b), c.id))
        })
        .collect();
    AabbTree::build(leaves)
}
