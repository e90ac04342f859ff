//! Clusters: groups of areas merged under an occlusion budget.

use std::collections::VecDeque;

use glam::Vec3;
use hashbrown::HashSet;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use visbake_core::{Aabb, BitVec, Result, VoxelBox, Winding};
use visbake_voxel::{OcclusionTracer, VoxelGrid};

use crate::area::{grow_boxes, Area, AreaLookup};
use crate::flow::PortalGraph;
use crate::options::MapBuildOptions;
use crate::portal::Portal;

/// A region made of one or more areas.
#[derive(Clone, Debug)]
pub struct AreaCluster {
    pub id: u32,
    /// Ids of the member areas.
    pub areas: Vec<u32>,
    /// The member areas' boxes.
    pub contained_areas: Vec<VoxelBox>,
    /// Boxes covering the cluster for the runtime index.
    pub cluster_boxes: Vec<VoxelBox>,
    /// Voxel bounds of every member.
    pub bounds: VoxelBox,
    /// Reached by the entity flood.
    pub occupied: bool,
    /// Touches the padding shell around the level.
    pub exterior: bool,
    /// Outgoing portal ids.
    pub portals: Vec<u32>,
    /// Visible cluster ids.
    pub pvs: BitVec,
}

impl AreaCluster {
    fn new(id: u32, area: u32, bounds: VoxelBox) -> Self {
        Self {
            id,
            areas: vec![area],
            contained_areas: vec![bounds],
            cluster_boxes: Vec::new(),
            bounds,
            occupied: false,
            exterior: false,
            portals: Vec::new(),
            pvs: BitVec::default(),
        }
    }

    /// Take area `id` into the cluster.
    pub fn add_area(&mut self, id: u32, bounds: VoxelBox) {
        self.areas.push(id);
        self.contained_areas.push(bounds);
        self.bounds = self.bounds.union(&bounds);
    }
}

/// Greedy area clustering with sampled occlusion.
pub struct Clusterer<'a> {
    grid: &'a VoxelGrid,
    tracer: &'a dyn OcclusionTracer,
    samples: u32,
    threshold: f32,
    max_size: Vec3,
    rng: ChaCha8Rng,
}

impl<'a> Clusterer<'a> {
    pub fn new(
        grid: &'a VoxelGrid,
        tracer: &'a dyn OcclusionTracer,
        options: &MapBuildOptions,
    ) -> Self {
        Self {
            grid,
            tracer,
            samples: options.cluster_merge_samples,
            threshold: options.cluster_occlusion_threshold,
            max_size: options.max_cluster_size,
            rng: ChaCha8Rng::seed_from_u64(options.random_seed),
        }
    }

    /// Assign every area to a cluster.
    ///
    /// Each cluster starts from the lowest unassigned area and absorbs
    /// adjacent unassigned areas until every remaining neighbor has been
    /// rejected once.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn cluster(&mut self, areas: &mut [Area], portals: &[Portal]) -> Vec<AreaCluster> {
        let mut clusters = Vec::new();
        let mut merges = 0usize;
        let mut rejections = 0usize;

        for seed in 0..areas.len() {
            if areas[seed].group.is_some() {
                continue;
            }
            let id = clusters.len() as u32;
            let mut cluster = AreaCluster::new(id, seed as u32, areas[seed].bounds);
            areas[seed].group = Some(id);
            let mut rejected: HashSet<u32> = HashSet::new();

            loop {
                let mut candidates: Vec<u32> = cluster
                    .areas
                    .iter()
                    .flat_map(|a| &areas[*a as usize].portals)
                    .map(|p| portals[*p as usize].to)
                    .filter(|to| areas[*to as usize].group.is_none() && !rejected.contains(to))
                    .collect();
                candidates.sort_unstable();
                candidates.dedup();
                if candidates.is_empty() {
                    break;
                }

                for candidate in candidates {
                    let bounds = areas[candidate as usize].bounds;
                    if self.too_large(&cluster.bounds.union(&bounds))
                        || self.merge_cost(&cluster, candidate, areas, portals) > self.threshold
                    {
                        rejected.insert(candidate);
                        rejections += 1;
                        continue;
                    }
                    cluster.add_area(candidate, bounds);
                    areas[candidate as usize].group = Some(id);
                    merges += 1;
                }
            }
            clusters.push(cluster);
        }

        tracing::debug!(clusters = clusters.len(), merges, rejections, "areas clustered");
        clusters
    }

    fn too_large(&self, bounds: &VoxelBox) -> bool {
        self.grid
            .get_box_bounds(bounds)
            .size()
            .cmpgt(self.max_size)
            .any()
    }

    /// `occluded fraction × outward portal area` of the cluster grown by
    /// `candidate`.
    fn merge_cost(
        &mut self,
        cluster: &AreaCluster,
        candidate: u32,
        areas: &[Area],
        portals: &[Portal],
    ) -> f32 {
        if self.samples == 0 {
            return 0.0;
        }
        let near = outward_portals(&cluster.areas, cluster.id, candidate, areas, portals);
        let far = outward_portals(&[candidate], cluster.id, candidate, areas, portals);
        let total_area: f32 = near.iter().chain(&far).map(|w| w.area()).sum();
        let near_boxes = &cluster.contained_areas;
        let far_boxes = [areas[candidate as usize].bounds];

        let mut occluded = 0u32;
        for _ in 0..self.samples {
            let a = self.sample_side(&near, near_boxes);
            let b = self.sample_side(&far, &far_boxes);
            if self.tracer.trace_line(a, b) {
                occluded += 1;
            }
        }
        occluded as f32 / self.samples as f32 * total_area
    }

    /// A random point on a random portal, or inside a random box when the
    /// side has no outward portal.
    fn sample_side(&mut self, portals: &[&Winding], boxes: &[VoxelBox]) -> Vec3 {
        if portals.is_empty() {
            let b = boxes[self.rng.gen_range(0..boxes.len())];
            let bounds = self.grid.get_box_bounds(&b);
            return random_point_in(&mut self.rng, &bounds);
        }
        let w = portals[self.rng.gen_range(0..portals.len())];
        random_point_on(&mut self.rng, w)
    }
}

/// Windings of portals leaving `members` for anything outside the cluster
/// and the candidate.
fn outward_portals<'p>(
    members: &[u32],
    cluster: u32,
    candidate: u32,
    areas: &[Area],
    portals: &'p [Portal],
) -> Vec<&'p Winding> {
    members
        .iter()
        .flat_map(|a| &areas[*a as usize].portals)
        .map(|p| &portals[*p as usize])
        .filter(|p| p.to != candidate && areas[p.to as usize].group != Some(cluster))
        .map(|p| &p.winding)
        .collect()
}

/// Uniform point on a convex polygon.
pub fn random_point_on(rng: &mut impl Rng, winding: &Winding) -> Vec3 {
    let p = winding.points();
    let areas: Vec<f32> = (1..p.len() - 1)
        .map(|i| (p[i] - p[0]).cross(p[i + 1] - p[0]).length())
        .collect();
    let total: f32 = areas.iter().sum();
    let mut pick = rng.gen::<f32>() * total;
    let mut tri = areas.len() - 1;
    for (i, a) in areas.iter().enumerate() {
        if pick < *a {
            tri = i;
            break;
        }
        pick -= a;
    }
    let (mut u, mut v) = (rng.gen::<f32>(), rng.gen::<f32>());
    if u + v > 1.0 {
        u = 1.0 - u;
        v = 1.0 - v;
    }
    p[0] + (p[tri + 1] - p[0]) * u + (p[tri + 2] - p[0]) * v
}

/// Uniform point strictly inside a box.
pub fn random_point_in(rng: &mut impl Rng, bounds: &Aabb) -> Vec3 {
    let t = Vec3::new(rng.gen(), rng.gen(), rng.gen());
    let inner = bounds.inflated(-bounds.size() * 0.01);
    inner.min + inner.size() * t
}

/// Clusters and the portals between them.
#[derive(Clone, Debug, Default)]
pub struct ClusterGraph {
    pub clusters: Vec<AreaCluster>,
    pub portals: Vec<Portal>,
}

impl ClusterGraph {
    /// Re-home area portals onto their clusters, dropping portals between
    /// areas of the same cluster.
    pub fn new(
        grid: &VoxelGrid,
        mut clusters: Vec<AreaCluster>,
        areas: &[Area],
        area_portals: &[Portal],
    ) -> Self {
        let mut portals = Vec::new();
        for portal in area_portals {
            let (Some(from), Some(to)) = (
                areas[portal.from as usize].group,
                areas[portal.to as usize].group,
            ) else {
                continue;
            };
            if from == to {
                continue;
            }
            clusters[from as usize].portals.push(portals.len() as u32);
            portals.push(portal.rehomed(from, to));
        }
        for cluster in &mut clusters {
            cluster.exterior = cluster
                .contained_areas
                .iter()
                .any(|b| grid.box_touches_border(b));
        }
        Self { clusters, portals }
    }

    /// Lookup from voxel to cluster id.
    pub fn lookup(&self) -> Result<AreaLookup> {
        AreaLookup::new(
            self.clusters
                .iter()
                .flat_map(|c| c.contained_areas.iter().map(move |b| (b, c.id))),
        )
    }

    /// Breadth-first flood from `starts`, marking reached clusters
    /// occupied. Returns true if an exterior cluster was reached.
    pub fn flood_occupied(&mut self, starts: &[u32]) -> bool {
        let mut queue: VecDeque<u32> = VecDeque::new();
        for &s in starts {
            let cluster = &mut self.clusters[s as usize];
            if !cluster.occupied {
                cluster.occupied = true;
                queue.push_back(s);
            }
        }
        let mut leaked = false;
        while let Some(c) = queue.pop_front() {
            leaked |= self.clusters[c as usize].exterior;
            for i in 0..self.clusters[c as usize].portals.len() {
                let to = self.portals[self.clusters[c as usize].portals[i] as usize].to;
                let next = &mut self.clusters[to as usize];
                if !next.occupied {
                    next.occupied = true;
                    queue.push_back(to);
                }
            }
        }
        leaked
    }

    /// Delete unoccupied clusters and every portal touching them, then
    /// renumber what is left. Returns the number of clusters removed.
    pub fn retain_occupied(&mut self) -> usize {
        let mut remap = vec![None; self.clusters.len()];
        let mut next = 0u32;
        for (old, cluster) in self.clusters.iter().enumerate() {
            if cluster.occupied {
                remap[old] = Some(next);
                next += 1;
            }
        }
        let removed = self.clusters.len() - next as usize;
        if removed == 0 {
            return 0;
        }

        let mut clusters: Vec<AreaCluster> = std::mem::take(&mut self.clusters)
            .into_iter()
            .filter(|c| c.occupied)
            .collect();
        for cluster in &mut clusters {
            cluster.id = remap[cluster.id as usize].unwrap_or(cluster.id);
            cluster.portals.clear();
        }
        let mut portals = Vec::new();
        for portal in &self.portals {
            if let (Some(from), Some(to)) = (remap[portal.from as usize], remap[portal.to as usize])
            {
                clusters[from as usize].portals.push(portals.len() as u32);
                portals.push(portal.rehomed(from, to));
            }
        }
        self.clusters = clusters;
        self.portals = portals;
        removed
    }
}

impl PortalGraph for ClusterGraph {
    fn region_count(&self) -> usize {
        self.clusters.len()
    }

    fn portals(&self) -> &[Portal] {
        &self.portals
    }

    fn region_portals(&self, region: u32) -> &[u32] {
        &self.clusters[region as usize].portals
    }
}

/// Fewest greedy boxes covering `cluster`, or its area boxes if greedy
/// growth does no better.
pub fn simplify_cluster(cluster: &AreaCluster, lookup: &AreaLookup) -> Result<Vec<VoxelBox>> {
    let boxes = grow_boxes(&cluster.bounds, |c| lookup.at(c) == Some(cluster.id))?;
    if boxes.len() > cluster.contained_areas.len() {
        Ok(cluster.contained_areas.clone())
    } else {
        Ok(boxes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visbake_core::VoxelCoord;
    use visbake_voxel::{VoxelSpace, VoxelTracer};

    use crate::area::AreaLookup;
    use crate::portal::area_portals;

    /// A 4x4x4 grid (6 with padding) cut into unit-thick slabs along X.
    fn slabs() -> (VoxelSpace, Vec<Area>, Vec<Portal>) {
        let space = VoxelSpace::new(Aabb::new(Vec3::ZERO, Vec3::splat(4.0)), Vec3::ONE).unwrap();
        let grid = *space.grid();
        let mut areas: Vec<Area> = (0..6)
            .map(|x| {
                Area::new(VoxelBox::new(
                    VoxelCoord::new(x, 0, 0),
                    VoxelCoord::new(x, 5, 5),
                ))
            })
            .collect();
        let lookup = AreaLookup::new(areas.iter().map(|a| &a.bounds).zip(0u32..)).unwrap();
        let mut portals = Vec::new();
        for id in 0..areas.len() as u32 {
            for p in area_portals(&grid, &lookup, &areas, id) {
                areas[id as usize].portals.push(portals.len() as u32);
                portals.push(p);
            }
        }
        (space, areas, portals)
    }

    #[test]
    fn open_space_merges_into_one_cluster() {
        let (space, mut areas, portals) = slabs();
        let tracer = VoxelTracer::new(&space);
        let options = MapBuildOptions {
            cluster_merge_samples: 200,
            ..Default::default()
        };
        let clusters = Clusterer::new(space.grid(), &tracer, &options).cluster(&mut areas, &portals);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].areas.len(), 6);
        assert!(areas.iter().all(|a| a.group == Some(0)));
    }

    #[test]
    fn size_cap_stops_growth() {
        let (space, mut areas, portals) = slabs();
        let tracer = VoxelTracer::new(&space);
        let options = MapBuildOptions {
            cluster_merge_samples: 50,
            max_cluster_size: Vec3::new(2.5, 100.0, 100.0),
            ..Default::default()
        };
        let clusters = Clusterer::new(space.grid(), &tracer, &options).cluster(&mut areas, &portals);
        assert_eq!(clusters.len(), 3);
        for c in &clusters {
            assert_eq!(c.areas.len(), 2);
        }

        let graph = ClusterGraph::new(space.grid(), clusters, &areas, &portals);
        // Interior portals are dropped; each cut between clusters keeps one
        // portal per direction.
        assert_eq!(graph.portals.len(), 4);
        assert!(graph.clusters.iter().all(|c| c.exterior));
    }

    #[test]
    fn pruning_removes_unreached_clusters_and_their_portals() {
        let (space, mut areas, portals) = slabs();
        let tracer = VoxelTracer::new(&space);
        let options = MapBuildOptions {
            cluster_merge_samples: 0,
            max_cluster_size: Vec3::new(1.5, 100.0, 100.0),
            ..Default::default()
        };
        let clusters = Clusterer::new(space.grid(), &tracer, &options).cluster(&mut areas, &portals);
        let mut graph = ClusterGraph::new(space.grid(), clusters, &areas, &portals);
        assert_eq!(graph.clusters.len(), 6);

        // Cut the chain between clusters 2 and 3 by hand.
        let keep: Vec<Portal> = graph
            .portals
            .iter()
            .filter(|p| !(p.from.min(p.to) == 2 && p.from.max(p.to) == 3))
            .cloned()
            .collect();
        graph.portals = keep;
        for c in &mut graph.clusters {
            c.portals.clear();
        }
        for (i, p) in graph.portals.iter().enumerate() {
            graph.clusters[p.from as usize].portals.push(i as u32);
        }

        graph.flood_occupied(&[1]);
        assert_eq!(graph.retain_occupied(), 3);
        assert_eq!(graph.clusters.len(), 3);
        assert!(graph
            .portals
            .iter()
            .all(|p| (p.from as usize) < 3 && (p.to as usize) < 3));
        assert_eq!(graph.portals.len(), 4);
    }

    #[test]
    fn simplification_never_adds_boxes() {
        let (space, mut areas, portals) = slabs();
        let tracer = VoxelTracer::new(&space);
        let options = MapBuildOptions {
            cluster_merge_samples: 0,
            ..Default::default()
        };
        let clusters = Clusterer::new(space.grid(), &tracer, &options).cluster(&mut areas, &portals);
        let graph = ClusterGraph::new(space.grid(), clusters, &areas, &portals);
        let lookup = graph.lookup().unwrap();
        let boxes = simplify_cluster(&graph.clusters[0], &lookup).unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].volume(), 6 * 6 * 6);
    }

    #[test]
    fn sampled_points_stay_on_their_polygon() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let w = Winding::axial_rect(1, 3.0, Vec3::ZERO, Vec3::new(2.0, 0.0, 5.0), true).unwrap();
        let bounds = w.bounds();
        for _ in 0..100 {
            let p = random_point_on(&mut rng, &w);
            assert!(w.plane().distance(p).abs() < 1e-4);
            assert!(bounds.inflated(Vec3::splat(1e-4)).contains_point(p));
        }
    }
}
