//! Input polygons of the BSP pipeline.

use visbake_core::{Plane, Winding};

use crate::scene::MapScene;

/// An occluder or hint polygon, or a fragment of one.
#[derive(Clone, Debug)]
pub struct BspFace {
    pub winding: Winding,
    pub plane: Plane,
    /// Added to the split score of this face's plane.
    pub priority: i32,
    /// Splits space but never blocks or renders.
    pub hint: bool,
    /// Some fragment faces an open leaf.
    pub visible: bool,
    /// Index of the input face this was cut from.
    pub source: usize,
}

impl BspFace {
    pub fn new(winding: Winding, priority: i32, hint: bool, source: usize) -> Self {
        Self {
            plane: winding.plane(),
            winding,
            priority,
            hint,
            visible: false,
            source,
        }
    }

    /// A piece of this face with the same plane and flags.
    pub fn fragment(&self, winding: Winding) -> Self {
        Self {
            winding,
            visible: false,
            ..self.clone()
        }
    }
}

/// Occluder polygons followed by hints, in scene order.
pub fn collect_faces(scene: &MapScene) -> Vec<BspFace> {
    let occluders = scene.occluder_polygons().cloned().map(|w| (w, 0, false));
    let hints = scene
        .hints
        .iter()
        .map(|h| (h.winding.clone(), h.priority, true));
    occluders
        .chain(hints)
        .enumerate()
        .map(|(i, (w, priority, hint))| BspFace::new(w, priority, hint, i))
        .collect()
}
