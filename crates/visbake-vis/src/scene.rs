//! Scene geometry and entities handed to the visibility builders.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use visbake_core::{Aabb, Plane, Result, Winding};

/// A mesh of convex polygons.
#[derive(Clone, Debug)]
pub struct MapMesh {
    pub polygons: Vec<Winding>,
    /// Only visibility-blocking meshes become occluders.
    pub blocks_visibility: bool,
}

impl MapMesh {
    /// Fan-triangulate every polygon.
    pub fn triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.polygons.iter().flat_map(|w| {
            let p = w.points();
            (1..p.len() - 1).map(move |i| [p[0], p[i], p[i + 1]])
        })
    }
}

/// A splitting-only polygon for the BSP pipeline.
#[derive(Clone, Debug)]
pub struct HintPolygon {
    pub winding: Winding,
    /// Added to the split score of the hint's plane.
    pub priority: i32,
}

/// A convex brush whose interior is never visible.
#[derive(Clone, Debug)]
pub struct BspSolid {
    /// Outward-facing bounding planes.
    planes: Vec<Plane>,
    /// One face per plane that survived clipping.
    faces: Vec<Winding>,
}

impl BspSolid {
    /// Build a solid from outward-facing planes.
    ///
    /// Returns `None` when the planes enclose no volume.
    pub fn from_planes(planes: Vec<Plane>) -> Result<Option<Self>> {
        let mut faces = Vec::with_capacity(planes.len());
        for (i, plane) in planes.iter().enumerate() {
            let mut face = Some(Winding::base_for_plane(plane));
            for (j, other) in planes.iter().enumerate() {
                let Some(w) = face else {
                    break;
                };
                if j != i {
                    face = w.chop(&-*other)?;
                } else {
                    face = Some(w);
                }
            }
            faces.extend(face);
        }
        Ok((faces.len() >= 4).then_some(Self { planes, faces }))
    }

    /// Axis-aligned box solid.
    pub fn from_box(min: Vec3, max: Vec3) -> Result<Option<Self>> {
        let planes = (0..3)
            .flat_map(|axis| {
                [
                    Plane::axial(axis, max[axis], true),
                    Plane::axial(axis, min[axis], false),
                ]
            })
            .collect();
        Self::from_planes(planes)
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn faces(&self) -> &[Winding] {
        &self.faces
    }

    /// Every corner of the solid.
    pub fn points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.faces.iter().flat_map(|f| f.points().iter().copied())
    }

    /// True if `point` is inside or within `epsilon` of the surface.
    pub fn contains_point(&self, point: Vec3, epsilon: f32) -> bool {
        self.planes.iter().all(|p| p.distance(point) <= epsilon)
    }
}

/// A named set of render polygons whose cluster membership is recorded.
#[derive(Clone, Debug)]
pub struct MeshGroup {
    pub name: String,
    pub polygons: Vec<Winding>,
}

/// All geometry one build consumes.
#[derive(Clone, Debug, Default)]
pub struct MapScene {
    pub meshes: Vec<MapMesh>,
    pub hints: Vec<HintPolygon>,
    pub solids: Vec<BspSolid>,
    pub mesh_groups: Vec<MeshGroup>,
}

impl MapScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an axis-aligned box brush: outward faces as an occluder mesh,
    /// plus the matching structural solid.
    pub fn add_box_brush(&mut self, min: Vec3, max: Vec3) {
        let polygons: Vec<Winding> = (0..3)
            .flat_map(|axis| {
                [
                    Winding::axial_rect(axis, max[axis], min, max, true),
                    Winding::axial_rect(axis, min[axis], min, max, false),
                ]
            })
            .flatten()
            .collect();
        if polygons.len() != 6 {
            tracing::warn!(?min, ?max, "skipping flat box brush");
            return;
        }
        self.meshes.push(MapMesh {
            polygons,
            blocks_visibility: true,
        });
        match BspSolid::from_box(min, max) {
            Ok(Some(solid)) => self.solids.push(solid),
            Ok(None) => {}
            Err(e) => tracing::warn!(?min, ?max, "box brush has no solid: {e}"),
        }
    }

    /// Bounds of every mesh polygon.
    pub fn bounds(&self) -> Aabb {
        self.meshes
            .iter()
            .flat_map(|m| &m.polygons)
            .fold(Aabb::EMPTY, |acc, w| acc.merge(&w.bounds()))
    }

    /// Triangles of every visibility-blocking mesh.
    pub fn occluder_triangles(&self) -> Vec<[Vec3; 3]> {
        self.meshes
            .iter()
            .filter(|m| m.blocks_visibility)
            .flat_map(MapMesh::triangles)
            .collect()
    }

    /// Polygons of every visibility-blocking mesh.
    pub fn occluder_polygons(&self) -> impl Iterator<Item = &Winding> {
        self.meshes
            .iter()
            .filter(|m| m.blocks_visibility)
            .flat_map(|m| &m.polygons)
    }
}

/// One entity of a map file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntity {
    pub properties: Vec<(String, String)>,
}

impl MapEntity {
    pub fn new(classname: &str) -> Self {
        Self {
            properties: vec![("classname".to_owned(), classname.to_owned())],
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.push((key.to_owned(), value.into()));
        self
    }

    /// Entity placed at `origin`.
    pub fn at(classname: &str, origin: Vec3) -> Self {
        Self::new(classname).with("origin", format!("{} {} {}", origin.x, origin.y, origin.z))
    }

    /// Value of the last property named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `"origin"` property parsed as three floats.
    pub fn origin(&self) -> Option<Vec3> {
        let mut parts = self.get("origin")?.split_whitespace().map(str::parse::<f32>);
        let x = parts.next()?.ok()?;
        let y = parts.next()?.ok()?;
        let z = parts.next()?.ok()?;
        parts.next().is_none().then_some(Vec3::new(x, y, z))
    }
}

/// The entity list of a parsed map.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapFile {
    pub entities: Vec<MapEntity>,
}

impl MapFile {
    /// Origins of every entity that has a well-formed one.
    pub fn origins(&self) -> Vec<Vec3> {
        self.entities.iter().filter_map(MapEntity::origin).collect()
    }
}
