//! Build-time BSP arena.
//!
//! Nodes, faces and portals live in flat vectors and refer to each other by
//! index. Every node is either a leaf or has exactly two children; child 0
//! is in front of the node's plane. One extra leaf stands for everything
//! outside the padded level bounds.

use glam::Vec3;
use visbake_core::constants::ON_EPSILON;
use visbake_core::{Aabb, Plane, Result, Winding, WindingSide};

use crate::bsp::face::BspFace;
use crate::bsp::portals::BspPortal;

#[derive(Clone, Debug, Default)]
pub struct BspNode {
    /// Split plane; unused on leaves.
    pub plane: Plane,
    /// `[front, back]`; unused on leaves.
    pub children: [u32; 2],
    pub parent: Option<u32>,
    pub is_leaf: bool,
    /// Inside a structural solid, or filled after the entity flood.
    pub opaque: bool,
    /// The leaf beyond the head node bounds.
    pub outside: bool,
    /// Reached by the entity flood.
    pub occupied: bool,
    /// Region id of an open leaf.
    pub leaf_id: Option<u32>,
    /// Portals currently linked to this node.
    pub portals: Vec<u32>,
    /// Face fragments coplanar with this node's plane.
    pub faces: Vec<u32>,
}

impl BspNode {
    fn leaf(parent: Option<u32>) -> Self {
        Self {
            parent,
            is_leaf: true,
            ..Default::default()
        }
    }

    /// A leaf a viewer could stand in.
    pub fn is_open_leaf(&self) -> bool {
        self.is_leaf && !self.opaque && !self.outside
    }
}

/// Everything the BSP pipeline builds, by index.
#[derive(Clone, Debug)]
pub struct BspArena {
    pub nodes: Vec<BspNode>,
    pub faces: Vec<BspFace>,
    pub portals: Vec<BspPortal>,
    pub root: u32,
    pub outside: u32,
    /// Input faces occupy `faces[..input_faces]`.
    pub input_faces: usize,
}

impl BspArena {
    /// Partition space with `faces`.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(faces: Vec<BspFace>) -> Result<Self> {
        let input_faces = faces.len();
        let mut arena = Self {
            nodes: Vec::new(),
            faces,
            portals: Vec::new(),
            root: 0,
            outside: 0,
            input_faces,
        };
        let all = (0..input_faces as u32).collect();
        arena.root = arena.make_subtree(all, None)?;
        arena.outside = arena.nodes.len() as u32;
        arena.nodes.push(BspNode {
            outside: true,
            ..BspNode::leaf(None)
        });
        tracing::debug!(
            nodes = arena.nodes.len(),
            fragments = arena.faces.len() - input_faces,
            "bsp tree built"
        );
        Ok(arena)
    }

    /// Build the subtree holding `faces`; a node with no faces is a leaf.
    pub fn make_subtree(&mut self, faces: Vec<u32>, parent: Option<u32>) -> Result<u32> {
        let id = self.nodes.len() as u32;
        self.nodes.push(BspNode::leaf(parent));
        let Some(best) = pick_best_split(&self.faces, &faces) else {
            return Ok(id);
        };
        let plane = self.faces[best as usize].plane;

        let mut front = Vec::new();
        let mut back = Vec::new();
        let mut on = Vec::new();
        for f in faces {
            let face = &self.faces[f as usize];
            match face.winding.plane_side(&plane) {
                WindingSide::On => on.push(f),
                WindingSide::Front => front.push(f),
                WindingSide::Back => back.push(f),
                WindingSide::Cross => {
                    let (fw, bw) = face.winding.clip_epsilon(&plane, ON_EPSILON)?;
                    let pieces: Vec<(Winding, bool)> = fw
                        .map(|w| (w, true))
                        .into_iter()
                        .chain(bw.map(|w| (w, false)))
                        .collect();
                    for (w, is_front) in pieces {
                        let piece = self.faces[f as usize].fragment(w);
                        let pid = self.faces.len() as u32;
                        self.faces.push(piece);
                        if is_front {
                            front.push(pid);
                        } else {
                            back.push(pid);
                        }
                    }
                }
            }
        }

        let node = &mut self.nodes[id as usize];
        node.is_leaf = false;
        node.plane = plane;
        node.faces = on;
        let f = self.make_subtree(front, Some(id))?;
        let b = self.make_subtree(back, Some(id))?;
        self.nodes[id as usize].children = [f, b];
        Ok(id)
    }

    /// Leaf holding `point`. Points on a plane go to the front.
    pub fn find_leaf(&self, point: Vec3) -> u32 {
        let mut node = self.root;
        loop {
            let n = &self.nodes[node as usize];
            if n.is_leaf {
                return node;
            }
            node = n.children[usize::from(n.plane.distance(point) < 0.0)];
        }
    }

    /// Ids of every leaf except the outside one, in node order.
    pub fn leaves(&self) -> impl Iterator<Item = u32> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf && !n.outside)
            .map(|(i, _)| i as u32)
    }

    /// Bounds of every portal around `leaf`.
    pub fn leaf_bounds(&self, leaf: u32) -> Aabb {
        self.nodes[leaf as usize]
            .portals
            .iter()
            .fold(Aabb::EMPTY, |acc, p| {
                acc.merge(&self.portals[*p as usize].winding.bounds())
            })
    }
}

/// Score each candidate plane and return the face whose plane wins.
///
/// `score = 5 × coplanar − 5 × splits − |front − back| + 5 if axial +
/// priority`. Ties keep the earliest face.
pub fn pick_best_split(faces: &[BspFace], candidates: &[u32]) -> Option<u32> {
    let mut best: Option<(i64, u32)> = None;
    for &c in candidates {
        let plane = faces[c as usize].plane;
        let (mut coplanar, mut splits, mut front, mut back) = (0i64, 0i64, 0i64, 0i64);
        for &other in candidates {
            match faces[other as usize].winding.plane_side(&plane) {
                WindingSide::On => coplanar += 1,
                WindingSide::Cross => splits += 1,
                WindingSide::Front => front += 1,
                WindingSide::Back => back += 1,
            }
        }
        let mut score = 5 * coplanar - 5 * splits - (front - back).abs();
        if plane.is_axial() {
            score += 5;
        }
        score += i64::from(faces[c as usize].priority);
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, c));
        }
    }
    best.map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::face::collect_faces;
    use crate::scene::{HintPolygon, MapScene};

    fn cube() -> MapScene {
        let mut scene = MapScene::new();
        scene.add_box_brush(Vec3::ZERO, Vec3::splat(2.0));
        scene
    }

    #[test]
    fn every_face_is_consumed_once() {
        let arena = BspArena::build(collect_faces(&cube())).unwrap();
        // A box needs no splits: six nodes, seven leaves, plus the outside.
        assert_eq!(arena.faces.len(), 6);
        let consumed: usize = arena.nodes.iter().map(|n| n.faces.len()).sum();
        assert_eq!(consumed, 6);
        assert_eq!(arena.nodes.iter().filter(|n| !n.is_leaf).count(), 6);
        assert_eq!(arena.leaves().count(), 7);
    }

    #[test]
    fn point_location_respects_planes() {
        let arena = BspArena::build(collect_faces(&cube())).unwrap();
        let inside = arena.find_leaf(Vec3::ONE);
        let outside = arena.find_leaf(Vec3::new(5.0, 1.0, 1.0));
        assert_ne!(inside, outside);
        assert_eq!(arena.find_leaf(Vec3::new(1.5, 0.5, 1.9)), inside);
    }

    #[test]
    fn hint_priority_wins_the_split() {
        let mut scene = cube();
        scene.hints.push(HintPolygon {
            winding: Winding::axial_rect(0, 1.0, Vec3::ZERO, Vec3::splat(2.0), true).unwrap(),
            priority: 100,
        });
        let faces = collect_faces(&scene);
        let all: Vec<u32> = (0..faces.len() as u32).collect();
        assert_eq!(pick_best_split(&faces, &all), Some(6));
        let arena = BspArena::build(faces).unwrap();
        assert!(arena.nodes[arena.root as usize].plane.normal.x > 0.99);
        // The hint cuts the four faces around it.
        assert_eq!(arena.faces.len(), 7 + 8);
    }

    #[test]
    fn no_faces_is_one_leaf() {
        let arena = BspArena::build(Vec::new()).unwrap();
        assert!(arena.nodes[arena.root as usize].is_leaf);
        assert_eq!(pick_best_split(&[], &[]), None);
    }
}
