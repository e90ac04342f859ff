//! The BSP visibility pipeline.

use std::collections::VecDeque;
use std::sync::OnceLock;

use glam::Vec3;
use visbake_core::constants::ON_EPSILON;
use visbake_core::{Aabb, BitVec, Error, Result, Winding, WindingSide};

use crate::builder::transpose_groups;
use crate::bsp::face::collect_faces;
use crate::bsp::output::{build_output_tree, BspTree};
use crate::bsp::tree::BspArena;
use crate::context::BuildContext;
use crate::flow::{compute_pvs, PortalGraph};
use crate::options::MapBuildOptions;
use crate::output::{BuildStats, PvsRecord, SpatialIndex, VisOutput};
use crate::portal::Portal;
use crate::scene::{BspSolid, MapFile, MapScene};

/// How the entity flood ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodOutcome {
    /// No entity stands in an open leaf.
    NoEntities,
    /// The flood reached the outside leaf.
    Leaked,
    /// Every reached leaf is inside the level.
    Sealed,
}

impl BspArena {
    /// Mark leaves lying wholly inside a solid as opaque.
    ///
    /// Each solid is pushed down the tree by its corner points. A leaf it
    /// reaches is opaque if every point of every portal around the leaf is
    /// inside the solid. Returns the number of leaves marked.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn filter_structural_solids_into_tree(&mut self, solids: &[BspSolid]) -> usize {
        let mut marked = 0;
        for solid in solids {
            let points: Vec<Vec3> = solid.points().collect();
            let mut stack = vec![self.root];
            while let Some(node) = stack.pop() {
                let n = &self.nodes[node as usize];
                if n.is_leaf {
                    if n.is_open_leaf() && self.leaf_inside_solid(node, solid) {
                        self.nodes[node as usize].opaque = true;
                        marked += 1;
                    }
                    continue;
                }
                let front = points.iter().any(|p| n.plane.distance(*p) > ON_EPSILON);
                let back = points.iter().any(|p| n.plane.distance(*p) < -ON_EPSILON);
                if back {
                    stack.push(n.children[1]);
                }
                if front {
                    stack.push(n.children[0]);
                }
            }
        }
        marked
    }

    fn leaf_inside_solid(&self, leaf: u32, solid: &BspSolid) -> bool {
        let portals = &self.nodes[leaf as usize].portals;
        !portals.is_empty()
            && portals.iter().all(|p| {
                self.portals[*p as usize]
                    .winding
                    .points()
                    .iter()
                    .all(|pt| solid.contains_point(*pt, ON_EPSILON))
            })
    }

    /// Breadth-first flood through open leaves from every entity origin.
    pub fn flood_entities(&mut self, origins: &[Vec3]) -> FloodOutcome {
        let mut queue = VecDeque::new();
        for origin in origins {
            let leaf = self.find_leaf(*origin);
            let node = &mut self.nodes[leaf as usize];
            if node.is_open_leaf() && !node.occupied {
                node.occupied = true;
                queue.push_back(leaf);
            }
        }
        if queue.is_empty() {
            return FloodOutcome::NoEntities;
        }

        let mut leaked = false;
        while let Some(leaf) = queue.pop_front() {
            for i in 0..self.nodes[leaf as usize].portals.len() {
                let p = &self.portals[self.nodes[leaf as usize].portals[i] as usize];
                let other = if p.nodes[0] == leaf { p.nodes[1] } else { p.nodes[0] };
                let next = &mut self.nodes[other as usize];
                if next.outside {
                    leaked = true;
                    continue;
                }
                if next.opaque || next.occupied {
                    continue;
                }
                next.occupied = true;
                queue.push_back(other);
            }
        }
        if leaked {
            FloodOutcome::Leaked
        } else {
            FloodOutcome::Sealed
        }
    }

    /// Make every open leaf the flood missed opaque.
    pub fn fill_outside(&mut self) -> usize {
        let mut filled = 0;
        for node in &mut self.nodes {
            if node.is_open_leaf() && !node.occupied {
                node.opaque = true;
                filled += 1;
            }
        }
        filled
    }

    /// Flag input faces with a fragment facing an open leaf.
    ///
    /// Returns the number of visible faces.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn mark_visible_sides(&mut self) -> Result<usize> {
        let mut visible = Vec::new();
        for node in &self.nodes {
            if node.is_leaf {
                continue;
            }
            for &f in &node.faces {
                let face = &self.faces[f as usize];
                if face.hint {
                    continue;
                }
                let facing = usize::from(face.plane.normal.dot(node.plane.normal) <= 0.0);
                if self.reaches_open_leaf(node.children[facing], &face.winding, face.plane.normal)? {
                    visible.push(face.source);
                }
            }
        }
        for source in visible {
            self.faces[source].visible = true;
        }
        Ok(self.faces[..self.input_faces]
            .iter()
            .filter(|f| f.visible)
            .count())
    }

    /// One bit per input face, set for faces flagged by
    /// [`mark_visible_sides`](Self::mark_visible_sides).
    pub fn visible_face_mask(&self) -> BitVec {
        let mut mask = BitVec::new(self.input_faces);
        for (i, face) in self.faces[..self.input_faces].iter().enumerate() {
            if face.visible {
                mask.set(i);
            }
        }
        mask
    }

    fn reaches_open_leaf(&self, node: u32, winding: &Winding, facing: Vec3) -> Result<bool> {
        let n = &self.nodes[node as usize];
        if n.is_leaf {
            return Ok(n.is_open_leaf());
        }
        let [front, back] = n.children;
        match winding.plane_side(&n.plane) {
            WindingSide::Front => self.reaches_open_leaf(front, winding, facing),
            WindingSide::Back => self.reaches_open_leaf(back, winding, facing),
            WindingSide::On => {
                let child = if facing.dot(n.plane.normal) > 0.0 { front } else { back };
                self.reaches_open_leaf(child, winding, facing)
            }
            WindingSide::Cross => {
                let (fw, bw) = winding.clip_epsilon(&n.plane, ON_EPSILON)?;
                if let Some(w) = fw {
                    if self.reaches_open_leaf(front, &w, facing)? {
                        return Ok(true);
                    }
                }
                match bw {
                    Some(w) => self.reaches_open_leaf(back, &w, facing),
                    None => Ok(false),
                }
            }
        }
    }

    /// Number every open leaf in node order. Returns the leaf count.
    pub fn assign_leaf_ids(&mut self) -> usize {
        let mut next = 0;
        for node in &mut self.nodes {
            node.leaf_id = None;
            if node.is_open_leaf() {
                node.leaf_id = Some(next);
                next += 1;
            }
        }
        next as usize
    }
}

/// Open leaves and the directed portals between them.
#[derive(Clone, Debug, Default)]
pub struct LeafGraph {
    /// Arena node of each leaf id.
    pub leaves: Vec<u32>,
    pub portals: Vec<Portal>,
    region_portals: Vec<Vec<u32>>,
}

impl LeafGraph {
    /// Two directed portals for every arena portal joining open leaves.
    pub fn new(arena: &BspArena) -> Self {
        let leaves: Vec<u32> = arena
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.leaf_id.is_some())
            .map(|(i, _)| i as u32)
            .collect();
        let mut region_portals = vec![Vec::new(); leaves.len()];
        let mut portals = Vec::new();

        for pid in arena.live_portals() {
            let p = &arena.portals[pid as usize];
            let front = &arena.nodes[p.nodes[0] as usize];
            let back = &arena.nodes[p.nodes[1] as usize];
            let (Some(f), Some(b)) = (front.leaf_id, back.leaf_id) else {
                continue;
            };
            // The arena portal faces its front leaf.
            region_portals[b as usize].push(portals.len() as u32);
            portals.push(Portal::new(b, f, p.winding.clone()));
            region_portals[f as usize].push(portals.len() as u32);
            portals.push(Portal::new(f, b, p.winding.reversed()));
        }
        Self {
            leaves,
            portals,
            region_portals,
        }
    }
}

impl PortalGraph for LeafGraph {
    fn region_count(&self) -> usize {
        self.leaves.len()
    }

    fn portals(&self) -> &[Portal] {
        &self.portals
    }

    fn region_portals(&self, region: u32) -> &[u32] {
        &self.region_portals[region as usize]
    }
}

/// Builds leaf visibility from a solid-leaf BSP of the occluders.
pub struct VisBuilderBsp<'a> {
    ctx: &'a BuildContext,
    options: &'a MapBuildOptions,
}

impl<'a> VisBuilderBsp<'a> {
    pub fn new(ctx: &'a BuildContext, options: &'a MapBuildOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { ctx, options })
    }

    /// Run every phase of the BSP pipeline.
    #[tracing::instrument(name = "vis_build_bsp", skip_all)]
    pub fn build(&self, scene: &MapScene, map: &MapFile) -> Result<VisOutput> {
        let faces = collect_faces(scene);
        if faces.is_empty() {
            return Err(Error::InvalidData("scene has no geometry".to_owned()));
        }
        let bounds = faces
            .iter()
            .fold(Aabb::EMPTY, |acc, f| acc.merge(&f.winding.bounds()));
        let mut stats = BuildStats {
            occluders: faces.len(),
            ..Default::default()
        };

        let mut arena = BspArena::build(faces)?;
        arena.make_head_portals(&bounds)?;
        arena.make_tree_portals(arena.root)?;
        let solid = arena.filter_structural_solids_into_tree(&scene.solids);
        stats.areas = arena.leaves().count();
        stats.regions_before_prune = stats.areas - solid;

        let leaked = match arena.flood_entities(&map.origins()) {
            FloodOutcome::Sealed => {
                let filled = arena.fill_outside();
                tracing::info!(filled, "unreachable leaves filled");
                false
            }
            FloodOutcome::NoEntities => {
                tracing::warn!(
                    entities = map.entities.len(),
                    "no entity in open space, vis will not be culled"
                );
                true
            }
            FloodOutcome::Leaked => {
                tracing::warn!("map leaked to the outside, vis will not be culled");
                true
            }
        };
        let visible_sides = arena.mark_visible_sides()?;
        stats.regions = arena.assign_leaf_ids();

        let graph = LeafGraph::new(&arena);
        let pvs = compute_pvs(self.ctx, &graph, self.options.show_progress)?;
        stats = stats.with_flow(&pvs.stats);

        let tree = build_output_tree(&arena);
        let mesh_groups = self.classify_mesh_groups(scene, &tree, stats.regions)?;
        let regions = graph
            .leaves
            .iter()
            .zip(pvs.region_pvs)
            .zip(mesh_groups)
            .map(|((leaf, visible), groups)| PvsRecord {
                visible,
                mesh_groups: groups,
                bounds: arena.leaf_bounds(*leaf),
            })
            .collect();

        tracing::info!(
            nodes = tree.nodes.len(),
            leaves = stats.regions,
            visible_sides,
            leaked,
            "bsp vis done"
        );
        Ok(VisOutput {
            index: SpatialIndex::Bsp(tree),
            regions,
            leaked,
            visible_faces: Some(arena.visible_face_mask()),
            stats,
        })
    }

    /// Per region, the mesh groups with a polygon in it.
    #[tracing::instrument(skip_all)]
    pub fn classify_mesh_groups(
        &self,
        scene: &MapScene,
        tree: &BspTree,
        regions: usize,
    ) -> Result<Vec<BitVec>> {
        let groups = &scene.mesh_groups;
        let hits: Vec<OnceLock<BitVec>> = groups.iter().map(|_| OnceLock::new()).collect();

        self.ctx.try_run_on_individual(
            "mesh_groups",
            groups.len(),
            self.options.show_progress,
            |g| {
                let mut touched = BitVec::new(regions);
                for polygon in &groups[g].polygons {
                    tree.classify_polygon(polygon, &mut |r| touched.set(r as usize))?;
                }
                hits[g].get_or_init(|| touched);
                Ok(())
            },
        )?;

        Ok(transpose_groups(hits, regions))
    }
}
