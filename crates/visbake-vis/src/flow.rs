//! Portal visibility flow, shared by the voxel and BSP pipelines.
//!
//! The flow runs over any [`PortalGraph`]: regions connected by directed
//! portals whose planes face into the region they lead to.
//!
//! 1. [`base_portal_vis`] finds, for each portal, the portals that could
//!    possibly be seen through it, and floods through them to get a cheap
//!    over-estimate (`flood`).
//! 2. Portals are processed in waves of equal estimate, cheapest first.
//!    A wave only prunes with the exact results of earlier waves, so the
//!    output does not depend on thread timing.
//! 3. Each portal's exact `vis` is found by recursing through the regions
//!    behind it, clipping the chain of portals by separating planes.
//! 4. A region sees everything its own portals see.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use visbake_core::constants::ON_EPSILON;
use visbake_core::{BitVec, Error, Plane, Result, Winding};

use crate::context::BuildContext;
use crate::portal::Portal;

/// Regions connected by directed portals.
pub trait PortalGraph: Sync {
    /// Number of regions; region ids are `0..region_count()`.
    fn region_count(&self) -> usize;

    /// Every directed portal; portal ids index this slice.
    fn portals(&self) -> &[Portal];

    /// Ids of the portals leading out of `region`.
    fn region_portals(&self, region: u32) -> &[u32];
}

/// Progress of a portal through the flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PortalStatus {
    None = 0,
    Working = 1,
    Done = 2,
}

/// Per-portal flow state.
#[derive(Debug)]
pub struct PortalFlow {
    /// Portals in front of this one that could face back at it.
    pub front: BitVec,
    /// Front portals reachable by flooding from the destination region.
    pub flood: BitVec,
    pub num_might_see: usize,
    status: AtomicU8,
    vis: OnceLock<BitVec>,
}

impl PortalFlow {
    pub fn status(&self) -> PortalStatus {
        match self.status.load(Ordering::Acquire) {
            0 => PortalStatus::None,
            1 => PortalStatus::Working,
            _ => PortalStatus::Done,
        }
    }

    /// Exact visible portals, once the portal is done.
    pub fn vis(&self) -> Option<&BitVec> {
        self.vis.get()
    }

    /// The tightest set a portal estimated at `might_see` may prune with.
    ///
    /// Exact results are only used from strictly cheaper portals, which
    /// always finished in an earlier wave.
    fn estimate_for(&self, might_see: usize) -> &BitVec {
        if self.num_might_see < might_see {
            self.vis.get().unwrap_or(&self.flood)
        } else {
            &self.flood
        }
    }
}

/// Summary of one flow run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowStats {
    pub portals: usize,
    /// Sum of `num_might_see` over all portals.
    pub might_see: usize,
    /// Sum of exact visible portal counts.
    pub visible: usize,
}

/// Result of [`compute_pvs`].
#[derive(Debug)]
pub struct PvsResult {
    /// Visible regions, indexed by region id.
    pub region_pvs: Vec<BitVec>,
    pub stats: FlowStats,
}

/// Run every flow phase over `graph`.
#[tracing::instrument(level = "debug", skip_all)]
pub fn compute_pvs<G: PortalGraph>(
    ctx: &BuildContext,
    graph: &G,
    show_progress: bool,
) -> Result<PvsResult> {
    let count = graph.portals().len();

    let base: Vec<OnceLock<PortalFlow>> = (0..count).map(|_| OnceLock::new()).collect();
    ctx.run_on_individual("base_portal_vis", count, show_progress, |p| {
        base[p].get_or_init(|| base_portal_vis(graph, p));
    });
    let states = base
        .into_iter()
        .enumerate()
        .map(|(p, cell)| {
            cell.into_inner()
                .ok_or_else(|| Error::Invariant(format!("portal {p} has no base vis")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by_key(|p| states[*p].num_might_see);

    for wave in order.chunk_by(|a, b| states[*a].num_might_see == states[*b].num_might_see) {
        ctx.try_run_on_individual("portal_flow", wave.len(), show_progress, |i| {
            portal_flow(graph, &states, wave[i])
        })?;
    }

    let regions = graph.region_count();
    let finals: Vec<OnceLock<BitVec>> = (0..regions).map(|_| OnceLock::new()).collect();
    ctx.try_run_on_individual("final_region_pvs", regions, show_progress, |r| {
        let pvs = final_region_pvs(graph, &states, r as u32)?;
        finals[r].get_or_init(|| pvs);
        Ok(())
    })?;
    let mut region_pvs: Vec<BitVec> = finals
        .into_iter()
        .map(|cell| cell.into_inner().unwrap_or_else(|| BitVec::new(regions)))
        .collect();
    symmetrize(&mut region_pvs);

    let stats = FlowStats {
        portals: count,
        might_see: states.iter().map(|s| s.num_might_see).sum(),
        visible: states
            .iter()
            .filter_map(PortalFlow::vis)
            .map(BitVec::count_ones)
            .sum(),
    };
    tracing::info!(
        portals = stats.portals,
        might_see = stats.might_see,
        visible = stats.visible,
        "portal flow done"
    );
    Ok(PvsResult { region_pvs, stats })
}

/// Cheap visibility estimate for portal `p`.
pub fn base_portal_vis<G: PortalGraph>(graph: &G, p: usize) -> PortalFlow {
    let portals = graph.portals();
    let portal = &portals[p];
    let mut front = BitVec::new(portals.len());

    for (q, other) in portals.iter().enumerate() {
        if q == p {
            continue;
        }
        // Some point of the other portal must be in front of this one.
        if other
            .winding
            .points()
            .iter()
            .all(|pt| portal.plane.distance(*pt) <= ON_EPSILON)
        {
            continue;
        }
        // Some point of this portal must be behind the other one.
        if portal
            .winding
            .points()
            .iter()
            .all(|pt| other.plane.distance(*pt) >= -ON_EPSILON)
        {
            continue;
        }
        front.set(q);
    }

    let flood = simple_flood(graph, &front, portal.to);
    PortalFlow {
        num_might_see: flood.count_ones(),
        front,
        flood,
        status: AtomicU8::new(PortalStatus::None as u8),
        vis: OnceLock::new(),
    }
}

/// Every portal of `front` reachable from `region` through portals of `front`.
fn simple_flood<G: PortalGraph>(graph: &G, front: &BitVec, region: u32) -> BitVec {
    let portals = graph.portals();
    let mut flood = BitVec::new(portals.len());
    let mut stack = vec![region];
    while let Some(region) = stack.pop() {
        for &q in graph.region_portals(region) {
            let qi = q as usize;
            if !front.get(qi) || flood.get(qi) {
                continue;
            }
            flood.set(qi);
            stack.push(portals[qi].to);
        }
    }
    flood
}

/// Depth-indexed scratch bitsets for one portal's flow.
struct FlowScratch {
    might: Vec<BitVec>,
    width: usize,
}

impl FlowScratch {
    fn new(width: usize) -> Self {
        Self {
            might: Vec::new(),
            width,
        }
    }

    fn ensure(&mut self, levels: usize) {
        while self.might.len() < levels {
            self.might.push(BitVec::new(self.width));
        }
    }
}

struct FlowRun<'a, G> {
    graph: &'a G,
    states: &'a [PortalFlow],
    base: usize,
}

/// Exact visibility for portal `p`; publishes into `states[p]`.
fn portal_flow<G: PortalGraph>(graph: &G, states: &[PortalFlow], p: usize) -> Result<()> {
    let state = &states[p];
    state
        .status
        .store(PortalStatus::Working as u8, Ordering::Release);

    let portal = &graph.portals()[p];
    let mut vis = BitVec::new(states.len());
    let mut scratch = FlowScratch::new(states.len());
    let run = FlowRun {
        graph,
        states,
        base: p,
    };
    run.recursive_flow(portal.to, 0, &portal.winding, None, &mut scratch, &mut vis)?;

    state.vis.get_or_init(|| vis);
    state
        .status
        .store(PortalStatus::Done as u8, Ordering::Release);
    Ok(())
}

impl<G: PortalGraph> FlowRun<'_, G> {
    fn recursive_flow(
        &self,
        region: u32,
        depth: usize,
        prev_source: &Winding,
        prev_pass: Option<&Winding>,
        scratch: &mut FlowScratch,
        vis: &mut BitVec,
    ) -> Result<()> {
        // A chain can never be longer than the portal count.
        if depth >= self.states.len() {
            return Ok(());
        }
        scratch.ensure(depth + 1);
        let portals = self.graph.portals();
        let base = &portals[self.base];

        for &q in self.graph.region_portals(region) {
            let q = q as usize;
            {
                let (done, rest) = scratch.might.split_at_mut(depth);
                let prev_might = done.last().unwrap_or(&self.states[self.base].flood);
                if !prev_might.get(q) {
                    continue;
                }
                let test = self.states[q].estimate_for(self.states[self.base].num_might_see);
                let more = rest[0].assign_and_with_news(prev_might, test, vis);
                if !more && vis.get(q) {
                    continue;
                }
            }

            let portal = &portals[q];

            // The part of the target in front of the base portal.
            let d = base.plane.distance(portal.origin);
            let pass = if d < -portal.radius {
                continue;
            } else if d > portal.radius {
                portal.winding.clone()
            } else {
                match portal.winding.chop(&base.plane)? {
                    Some(w) => w,
                    None => continue,
                }
            };

            // The part of the source behind the target.
            let d = portal.plane.distance(base.origin);
            let source = if d > base.radius {
                continue;
            } else if d < -base.radius {
                prev_source.clone()
            } else {
                match prev_source.chop(&-portal.plane)? {
                    Some(w) => w,
                    None => continue,
                }
            };

            let pass = match prev_pass {
                // The first portal behind the base can only be blocked if coplanar.
                None => pass,
                Some(prev_pass) => {
                    let Some(pass) = clip_to_separators(&source, prev_pass, pass, false)? else {
                        continue;
                    };
                    let Some(pass) = clip_to_separators(prev_pass, &source, pass, true)? else {
                        continue;
                    };
                    pass
                }
            };

            vis.set(q);
            self.recursive_flow(portal.to, depth + 1, &source, Some(&pass), scratch, vis)?;
        }
        Ok(())
    }
}

/// Clip `target` by every plane through an edge of `source` and a point of
/// `pass` that has `source` and `pass` on opposite sides.
///
/// With `flip` unset the side holding `pass` is kept; with `flip` set the
/// side holding `source` is kept. Returns `None` once nothing is left.
pub fn clip_to_separators(
    source: &Winding,
    pass: &Winding,
    target: Winding,
    flip: bool,
) -> Result<Option<Winding>> {
    let src = source.points();
    let pts = pass.points();
    let mut target = target;

    for i in 0..src.len() {
        let l = (i + 1) % src.len();
        let edge = src[l] - src[i];

        for (j, &pass_point) in pts.iter().enumerate() {
            let normal = edge.cross(pass_point - src[i]);
            let length_sq = normal.length_squared();
            if length_sq < ON_EPSILON {
                continue;
            }
            let normal = normal / length_sq.sqrt();
            let mut plane = Plane::new(normal, pass_point.dot(normal));

            // Which side holds the source?
            let mut source_in_front = None;
            for (k, p) in src.iter().enumerate() {
                if k == i || k == l {
                    continue;
                }
                let d = plane.distance(*p);
                if d < -ON_EPSILON {
                    source_in_front = Some(false);
                    break;
                } else if d > ON_EPSILON {
                    source_in_front = Some(true);
                    break;
                }
            }
            let Some(source_in_front) = source_in_front else {
                // Planar with the source.
                continue;
            };
            if source_in_front {
                plane = -plane;
            }

            // Every pass point must now be in front, at least one strictly.
            let mut in_front = 0;
            let mut separates = true;
            for (k, p) in pts.iter().enumerate() {
                if k == j {
                    continue;
                }
                let d = plane.distance(*p);
                if d < -ON_EPSILON {
                    separates = false;
                    break;
                } else if d > ON_EPSILON {
                    in_front += 1;
                }
            }
            if !separates || in_front == 0 {
                continue;
            }

            if flip {
                plane = -plane;
            }
            match target.chop(&plane)? {
                Some(w) => target = w,
                None => return Ok(None),
            }
        }
    }
    Ok(Some(target))
}

/// Regions visible from `region`: its own portals, everything they see,
/// and the region itself.
pub fn final_region_pvs<G: PortalGraph>(
    graph: &G,
    states: &[PortalFlow],
    region: u32,
) -> Result<BitVec> {
    let portals = graph.portals();
    let mut portal_vector = BitVec::new(portals.len());
    for &q in graph.region_portals(region) {
        let state = &states[q as usize];
        let vis = match (state.status(), state.vis()) {
            (PortalStatus::Done, Some(vis)) => vis,
            _ => {
                return Err(Error::Invariant(format!(
                    "portal {q} of region {region} not done"
                )))
            }
        };
        portal_vector |= vis;
        portal_vector.set(q as usize);
    }

    let mut pvs = BitVec::new(graph.region_count());
    for q in portal_vector.iter_ones() {
        pvs.set(portals[q].to as usize);
    }
    pvs.set(region as usize);
    Ok(pvs)
}

/// Make `X sees Y` imply `Y sees X`.
pub fn symmetrize(region_pvs: &mut [BitVec]) {
    let mut missing = Vec::new();
    for (x, pvs) in region_pvs.iter().enumerate() {
        for y in pvs.iter_ones() {
            if !region_pvs[y].get(x) {
                missing.push((y, x));
            }
        }
    }
    for (y, x) in missing {
        region_pvs[y].set(x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    /// Regions in a row along +X, joined by unit-wide portals on x == i.
    struct Chain {
        portals: Vec<Portal>,
        region_portals: Vec<Vec<u32>>,
    }

    impl Chain {
        /// `offsets[i]` is the y position of the portal between region i and i + 1.
        fn new(offsets: &[f32]) -> Self {
            let mut portals = Vec::new();
            let mut region_portals = vec![Vec::new(); offsets.len() + 1];
            for (i, y) in offsets.iter().enumerate() {
                let lo = Vec3::new(0.0, *y, 0.0);
                let hi = Vec3::new(0.0, y + 1.0, 1.0);
                let w = Winding::axial_rect(0, i as f32, lo, hi, true).unwrap();
                let forward = Portal::new(i as u32, i as u32 + 1, w);
                let back = forward.reversed();
                region_portals[i].push(portals.len() as u32);
                portals.push(forward);
                region_portals[i + 1].push(portals.len() as u32);
                portals.push(back);
            }
            Self {
                portals,
                region_portals,
            }
        }
    }

    impl PortalGraph for Chain {
        fn region_count(&self) -> usize {
            self.region_portals.len()
        }

        fn portals(&self) -> &[Portal] {
            &self.portals
        }

        fn region_portals(&self, region: u32) -> &[u32] {
            &self.region_portals[region as usize]
        }
    }

    fn ids(bits: &BitVec) -> Vec<usize> {
        bits.iter_ones().collect()
    }

    #[test]
    fn base_vis_excludes_coplanar_and_backward_portals() {
        let chain = Chain::new(&[0.0, 0.0, 0.0]);
        let base = base_portal_vis(&chain, 0);
        // Forward portals 2 and 4 only; 1 is coplanar, 3 and 5 face back.
        assert_eq!(ids(&base.front), vec![2, 4]);
        assert_eq!(ids(&base.flood), vec![2, 4]);
        assert_eq!(base.num_might_see, 2);
    }

    #[test]
    fn straight_chain_sees_everything() {
        let chain = Chain::new(&[0.0, 0.0, 0.0]);
        let ctx = BuildContext::new(2).unwrap();
        let result = compute_pvs(&ctx, &chain, false).unwrap();
        for pvs in &result.region_pvs {
            assert_eq!(ids(pvs), vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn offset_portals_block_the_far_region() {
        // Through portals at y 0..1 then 5..6, sightlines reach x == 2 at
        // y >= 9; the third portal at y -6..-5 is hidden.
        let chain = Chain::new(&[0.0, 5.0, -6.0]);
        let ctx = BuildContext::new(2).unwrap();
        let result = compute_pvs(&ctx, &chain, false).unwrap();
        assert_eq!(ids(&result.region_pvs[0]), vec![0, 1, 2]);
        assert_eq!(ids(&result.region_pvs[1]), vec![0, 1, 2, 3]);
        assert_eq!(ids(&result.region_pvs[3]), vec![1, 2, 3]);
        for (x, pvs) in result.region_pvs.iter().enumerate() {
            assert!(pvs.get(x));
            for y in pvs.iter_ones() {
                assert!(result.region_pvs[y].get(x));
            }
        }
    }

    #[test]
    fn separators_clip_hidden_target() {
        let source = Winding::axial_rect(0, 0.0, Vec3::ZERO, Vec3::new(0.0, 1.0, 1.0), true).unwrap();
        let pass = Winding::axial_rect(0, 1.0, Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 6.0, 1.0), true)
            .unwrap();
        let hidden =
            Winding::axial_rect(0, 2.0, Vec3::new(0.0, -6.0, 0.0), Vec3::new(0.0, -5.0, 1.0), true)
                .unwrap();
        assert!(clip_to_separators(&source, &pass, hidden, false).unwrap().is_none());

        let seen = Winding::axial_rect(0, 2.0, Vec3::new(0.0, 9.0, 0.0), Vec3::new(0.0, 12.0, 1.0), true)
            .unwrap();
        let clipped = clip_to_separators(&source, &pass, seen, false).unwrap().unwrap();
        assert!(clipped.area() > 0.5);
    }

    #[test]
    fn symmetrize_adds_reverse_links() {
        let mut pvs = vec![BitVec::new(3), BitVec::new(3), BitVec::new(3)];
        pvs[0].set(0);
        pvs[0].set(2);
        pvs[1].set(1);
        pvs[2].set(2);
        symmetrize(&mut pvs);
        assert_eq!(ids(&pvs[2]), vec![0, 2]);
        assert_eq!(ids(&pvs[1]), vec![1]);
    }
}
