//! Portals between BSP leaves.
//!
//! The head node starts with six portals to the outside leaf, one per side
//! of the padded level bounds. Walking down the tree, each node gets one new
//! portal on its split plane, clipped to the node's volume, and the node's
//! existing portals are split between its two children. When the walk ends
//! every portal joins two leaves.

use glam::Vec3;
use visbake_core::constants::SPLIT_WINDING_EPSILON;
use visbake_core::{Aabb, Error, Plane, Result, Winding};

use crate::bsp::tree::BspArena;

/// Padding between the level bounds and the head portals.
pub const BSP_SIDE_SPACE: f32 = 8.0;
const BASE_WINDING_EPSILON: f32 = 0.001;
const NODE_PORTAL_EPSILON: f32 = 0.1;

/// A polygon joining two nodes. The plane faces `nodes[0]`.
#[derive(Clone, Debug)]
pub struct BspPortal {
    pub plane: Plane,
    /// The node whose split created the portal; `None` for head portals.
    pub on_node: Option<u32>,
    /// `[front, back]`.
    pub nodes: [u32; 2],
    pub winding: Winding,
}

impl BspArena {
    /// Six inward-facing portals around the padded `bounds`.
    pub fn make_head_portals(&mut self, bounds: &Aabb) -> Result<()> {
        let lo = bounds.min - Vec3::splat(BSP_SIDE_SPACE);
        let hi = bounds.max + Vec3::splat(BSP_SIDE_SPACE);
        let planes: Vec<Plane> = [false, true]
            .into_iter()
            .flat_map(|upper| {
                (0..3).map(move |axis| {
                    if upper {
                        Plane::axial(axis, hi[axis], false)
                    } else {
                        Plane::axial(axis, lo[axis], true)
                    }
                })
            })
            .collect();

        for (i, plane) in planes.iter().enumerate() {
            let mut winding = Some(Winding::base_for_plane(plane));
            for (_, other) in planes.iter().enumerate().filter(|(j, _)| *j != i) {
                let Some(w) = winding else {
                    break;
                };
                winding = w.chop(other)?;
            }
            let Some(winding) = winding else {
                continue;
            };
            let id = self.portals.len() as u32;
            self.portals.push(BspPortal {
                plane: *plane,
                on_node: None,
                nodes: [self.root, self.outside],
                winding,
            });
            self.add_portal_to_nodes(id, self.root, self.outside);
        }
        Ok(())
    }

    /// Create and distribute portals for every node under `node`.
    pub fn make_tree_portals(&mut self, node: u32) -> Result<()> {
        if self.nodes[node as usize].is_leaf {
            return Ok(());
        }
        self.make_node_portal(node)?;
        self.split_node_portals(node)?;
        let [front, back] = self.nodes[node as usize].children;
        self.make_tree_portals(front)?;
        self.make_tree_portals(back)
    }

    /// The huge winding on `node`'s plane, clipped to the node's ancestors.
    pub fn base_winding_for_node(&self, node: u32) -> Result<Option<Winding>> {
        let mut winding = Winding::base_for_plane(&self.nodes[node as usize].plane);
        let mut child = node;
        while let Some(parent) = self.nodes[child as usize].parent {
            let p = &self.nodes[parent as usize];
            let plane = if p.children[0] == child { p.plane } else { -p.plane };
            let Some(clipped) = winding.chop_epsilon(&plane, BASE_WINDING_EPSILON)? else {
                return Ok(None);
            };
            winding = clipped;
            child = parent;
        }
        Ok(Some(winding))
    }

    /// Add the portal lying on `node`'s split plane, between its children.
    pub fn make_node_portal(&mut self, node: u32) -> Result<()> {
        let Some(mut winding) = self.base_winding_for_node(node)? else {
            return Ok(());
        };
        for &pid in &self.nodes[node as usize].portals {
            let portal = &self.portals[pid as usize];
            let plane = if self.portal_side(pid, node)? == 0 {
                portal.plane
            } else {
                -portal.plane
            };
            let Some(clipped) = winding.chop_epsilon(&plane, NODE_PORTAL_EPSILON)? else {
                return Ok(());
            };
            winding = clipped;
        }
        if winding.is_tiny() {
            return Ok(());
        }

        let n = &self.nodes[node as usize];
        let [front, back] = n.children;
        let id = self.portals.len() as u32;
        self.portals.push(BspPortal {
            plane: n.plane,
            on_node: Some(node),
            nodes: [front, back],
            winding,
        });
        self.add_portal_to_nodes(id, front, back);
        Ok(())
    }

    /// Move `node`'s portals onto its children, splitting those that cross
    /// the node's plane. Tiny pieces are dropped.
    pub fn split_node_portals(&mut self, node: u32) -> Result<()> {
        let n = &self.nodes[node as usize];
        let plane = n.plane;
        let [front, back] = n.children;
        let list = std::mem::take(&mut self.nodes[node as usize].portals);

        for pid in list {
            let side = self.portal_side(pid, node)?;
            let other = self.portals[pid as usize].nodes[1 - side];
            self.remove_portal_from_node(pid, other);

            let (f, b) = self.portals[pid as usize]
                .winding
                .clip_epsilon(&plane, SPLIT_WINDING_EPSILON)?;
            let f = f.filter(|w| !w.is_tiny());
            let b = b.filter(|w| !w.is_tiny());

            match (f, b) {
                (None, None) => {}
                (None, Some(_)) => self.relink(pid, back, other, side),
                (Some(_), None) => self.relink(pid, front, other, side),
                (Some(f), Some(b)) => {
                    let split = BspPortal {
                        winding: b,
                        ..self.portals[pid as usize].clone()
                    };
                    self.portals[pid as usize].winding = f;
                    let new_id = self.portals.len() as u32;
                    self.portals.push(split);
                    self.relink(pid, front, other, side);
                    self.relink(new_id, back, other, side);
                }
            }
        }
        Ok(())
    }

    /// Which side of portal `pid` `node` is on: 0 for front, 1 for back.
    pub fn portal_side(&self, pid: u32, node: u32) -> Result<usize> {
        let nodes = self.portals[pid as usize].nodes;
        if nodes[0] == node {
            Ok(0)
        } else if nodes[1] == node {
            Ok(1)
        } else {
            Err(Error::Invariant(format!(
                "portal {pid} is listed on node {node} but joins {nodes:?}"
            )))
        }
    }

    fn relink(&mut self, pid: u32, child: u32, other: u32, side: usize) {
        if side == 0 {
            self.add_portal_to_nodes(pid, child, other);
        } else {
            self.add_portal_to_nodes(pid, other, child);
        }
    }

    fn add_portal_to_nodes(&mut self, pid: u32, front: u32, back: u32) {
        self.portals[pid as usize].nodes = [front, back];
        self.nodes[front as usize].portals.push(pid);
        self.nodes[back as usize].portals.push(pid);
    }

    fn remove_portal_from_node(&mut self, pid: u32, node: u32) {
        self.nodes[node as usize].portals.retain(|p| *p != pid);
    }

    /// Ids of portals still linked to some node, ascending.
    pub fn live_portals(&self) -> Vec<u32> {
        let mut live: Vec<u32> = self
            .nodes
            .iter()
            .flat_map(|n| n.portals.iter().copied())
            .collect();
        live.sort_unstable();
        live.dedup();
        live
    }
}
