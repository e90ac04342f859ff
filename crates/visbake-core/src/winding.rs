//! Convex polygons ("windings") and their clipping operations.
//!
//! Every winding carries the plane it lies on. The plane is computed once
//! from the points when the winding is created and is inherited unchanged
//! by every piece produced by clipping, so repeated clips never drift.
//!
//! Points are ordered counter-clockwise when viewed from the front of the
//! plane (`(p1 - p0) × (p2 - p0)` points along the normal).

use glam::Vec3;

use crate::constants::{EDGE_LENGTH, MAX_WINDING_POINTS, MAX_WORLD_COORD, ON_EPSILON};
use crate::error::{Error, Result};
use crate::math::Aabb;
use crate::plane::{Plane, PlaneSide};

/// Classification of a whole winding against a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindingSide {
    /// Every point is in front of (or on) the plane, at least one strictly.
    Front,
    /// Every point is behind (or on) the plane, at least one strictly.
    Back,
    /// Every point lies on the plane.
    On,
    /// Points lie on both sides.
    Cross,
}

/// Front and back pieces of a clipped winding.
pub type Split = (Option<Winding>, Option<Winding>);

/// A convex polygon with at most [`MAX_WINDING_POINTS`] points.
#[derive(Debug, Clone, PartialEq)]
pub struct Winding {
    points: Vec<Vec3>,
    plane: Plane,
}

impl Winding {
    /// Creates a winding from ordered points, computing its plane.
    ///
    /// Returns `None` for fewer than 3 or more than [`MAX_WINDING_POINTS`]
    /// points, or a degenerate (zero area) polygon.
    pub fn new(points: Vec<Vec3>) -> Option<Self> {
        if points.len() < 3 || points.len() > MAX_WINDING_POINTS {
            return None;
        }
        let plane = newell_plane(&points)?;
        Some(Self { points, plane })
    }

    /// Creates a winding on a known plane. The caller guarantees coplanarity.
    fn with_plane(points: Vec<Vec3>, plane: Plane) -> Result<Option<Self>> {
        if points.len() > MAX_WINDING_POINTS {
            return Err(Error::Invariant(format!(
                "clipped winding has {} points, limit is {MAX_WINDING_POINTS}",
                points.len()
            )));
        }
        Ok((points.len() >= 3).then_some(Self { points, plane }))
    }

    /// A huge quad lying on `plane`, used as the starting point for
    /// carving node and solid faces.
    pub fn base_for_plane(plane: &Plane) -> Self {
        let normal = plane.normal;
        let abs = normal.abs();
        let major = if abs.x >= abs.y && abs.x >= abs.z {
            0
        } else if abs.y >= abs.z {
            1
        } else {
            2
        };

        let mut up = if major == 2 { Vec3::X } else { Vec3::Z };
        up -= normal * up.dot(normal);
        let up = up.normalize() * MAX_WORLD_COORD;
        let right = up.cross(normal).normalize() * MAX_WORLD_COORD;
        let origin = normal * plane.dist;

        let points = vec![
            origin - right - up,
            origin + right - up,
            origin + right + up,
            origin - right + up,
        ];
        // Ordered so the right-hand normal matches `plane`.
        let points = if (points[1] - points[0])
            .cross(points[2] - points[0])
            .dot(normal)
            < 0.0
        {
            points.into_iter().rev().collect()
        } else {
            points
        };
        Self {
            points,
            plane: *plane,
        }
    }

    /// Rectangle on the axial plane `p[axis] == at` spanning `lo..hi` on the
    /// other two axes, facing +axis when `positive` and -axis otherwise.
    ///
    /// The plane is computed from the points like any other winding.
    pub fn axial_rect(axis: usize, at: f32, lo: Vec3, hi: Vec3, positive: bool) -> Option<Self> {
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let corner = |cu: f32, cv: f32| {
            let mut p = Vec3::ZERO;
            p[axis] = at;
            p[u] = cu;
            p[v] = cv;
            p
        };
        let mut points = vec![
            corner(lo[u], lo[v]),
            corner(hi[u], lo[v]),
            corner(hi[u], hi[v]),
            corner(lo[u], hi[v]),
        ];
        if !positive {
            points.reverse();
        }
        Self::new(points)
    }

    /// The points of the winding.
    #[inline]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed winding.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The plane the winding lies on.
    #[inline]
    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// Polygon area.
    pub fn area(&self) -> f32 {
        let p0 = self.points[0];
        self.points
            .windows(2)
            .skip(1)
            .map(|pair| (pair[0] - p0).cross(pair[1] - p0).length() * 0.5)
            .sum()
    }

    /// Average of the points.
    pub fn center(&self) -> Vec3 {
        self.points.iter().copied().sum::<Vec3>() / self.points.len() as f32
    }

    /// Distance from `origin` to the farthest point.
    pub fn radius_from(&self, origin: Vec3) -> f32 {
        self.points
            .iter()
            .map(|p| p.distance(origin))
            .fold(0.0, f32::max)
    }

    /// Bounding box of the points.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.points.iter().copied())
    }

    /// The same polygon seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            points: self.points.iter().rev().copied().collect(),
            plane: -self.plane,
        }
    }

    /// True if the polygon has fewer than three edges longer than [`EDGE_LENGTH`].
    pub fn is_tiny(&self) -> bool {
        let n = self.points.len();
        let mut edges = 0;
        for i in 0..n {
            let j = (i + 1) % n;
            if self.points[j].distance(self.points[i]) > EDGE_LENGTH {
                edges += 1;
                if edges == 3 {
                    return false;
                }
            }
        }
        true
    }

    /// Classify the whole winding against a plane.
    pub fn plane_side(&self, plane: &Plane) -> WindingSide {
        let mut front = false;
        let mut back = false;
        for p in &self.points {
            match plane.classify(*p) {
                PlaneSide::Front => front = true,
                PlaneSide::Back => back = true,
                PlaneSide::On => {}
            }
            if front && back {
                return WindingSide::Cross;
            }
        }
        match (front, back) {
            (true, _) => WindingSide::Front,
            (_, true) => WindingSide::Back,
            _ => WindingSide::On,
        }
    }

    /// Keep the part in front of `plane` using [`ON_EPSILON`].
    ///
    /// Returns `None` if nothing lies in front. Points within the epsilon
    /// count as on the plane and are kept. Fails if the clipped polygon
    /// would exceed [`MAX_WINDING_POINTS`].
    pub fn chop(&self, plane: &Plane) -> Result<Option<Self>> {
        self.chop_epsilon(plane, ON_EPSILON)
    }

    /// Keep the part in front of `plane` with a custom epsilon.
    pub fn chop_epsilon(&self, plane: &Plane, epsilon: f32) -> Result<Option<Self>> {
        let (dists, sides) = self.classify_points(plane, epsilon);
        let front = sides.iter().any(|s| *s == PlaneSide::Front);
        let back = sides.iter().any(|s| *s == PlaneSide::Back);
        if !front {
            return Ok(None);
        }
        if !back {
            return Ok(Some(self.clone()));
        }
        Ok(self.split(plane, &dists, &sides)?.0)
    }

    /// Split into the parts in front of and behind `plane`.
    ///
    /// A winding lying on the plane (within `epsilon`) goes to the back.
    pub fn clip_epsilon(&self, plane: &Plane, epsilon: f32) -> Result<Split> {
        let (dists, sides) = self.classify_points(plane, epsilon);
        let front = sides.iter().any(|s| *s == PlaneSide::Front);
        let back = sides.iter().any(|s| *s == PlaneSide::Back);
        if !front {
            return Ok((None, Some(self.clone())));
        }
        if !back {
            return Ok((Some(self.clone()), None));
        }
        self.split(plane, &dists, &sides)
    }

    fn classify_points(&self, plane: &Plane, epsilon: f32) -> (Vec<f32>, Vec<PlaneSide>) {
        let dists: Vec<f32> = self.points.iter().map(|p| plane.distance(*p)).collect();
        let sides = dists
            .iter()
            .map(|d| {
                if *d > epsilon {
                    PlaneSide::Front
                } else if *d < -epsilon {
                    PlaneSide::Back
                } else {
                    PlaneSide::On
                }
            })
            .collect();
        (dists, sides)
    }

    fn split(
        &self,
        plane: &Plane,
        dists: &[f32],
        sides: &[PlaneSide],
    ) -> Result<Split> {
        let n = self.points.len();
        let mut front = Vec::with_capacity(n + 4);
        let mut back = Vec::with_capacity(n + 4);

        for i in 0..n {
            let p1 = self.points[i];
            match sides[i] {
                PlaneSide::On => {
                    front.push(p1);
                    back.push(p1);
                    continue;
                }
                PlaneSide::Front => front.push(p1),
                PlaneSide::Back => back.push(p1),
            }

            let j = (i + 1) % n;
            if sides[j] == PlaneSide::On || sides[j] == sides[i] {
                continue;
            }

            let p2 = self.points[j];
            let t = dists[i] / (dists[i] - dists[j]);
            let mut mid = p1 + (p2 - p1) * t;
            // Avoid round off error on axial planes.
            for axis in 0..3 {
                if plane.normal[axis] == 1.0 {
                    mid[axis] = plane.dist;
                } else if plane.normal[axis] == -1.0 {
                    mid[axis] = -plane.dist;
                }
            }
            front.push(mid);
            back.push(mid);
        }

        Ok((
            Self::with_plane(front, self.plane)?,
            Self::with_plane(back, self.plane)?,
        ))
    }
}

/// Plane of a polygon via Newell's method, robust to collinear leading points.
fn newell_plane(points: &[Vec3]) -> Option<Plane> {
    let mut normal = Vec3::ZERO;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    let centroid = points.iter().copied().sum::<Vec3>() / points.len() as f32;
    Plane::from_point_normal(centroid, normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn axial_rect_faces_requested_direction() {
        let lo = Vec3::new(0.0, 1.0, 2.0);
        let hi = Vec3::new(2.0, 3.0, 5.0);
        let pos = Winding::axial_rect(0, 4.0, lo, hi, true).unwrap();
        assert_relative_eq!(pos.plane().normal.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(pos.plane().dist, 4.0, epsilon = 1e-5);
        assert_relative_eq!(pos.area(), 6.0, epsilon = 1e-5);
        let neg = Winding::axial_rect(2, 1.0, lo, hi, false).unwrap();
        assert_relative_eq!(neg.plane().normal.z, -1.0, epsilon = 1e-6);
        assert_relative_eq!(neg.plane().dist, -1.0, epsilon = 1e-5);
    }

    fn unit_square() -> Winding {
        Winding::new(vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(4.0, 4.0, 0.0),
            Vec3::new(0.0, 4.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn plane_follows_counter_clockwise_order() {
        let w = unit_square();
        assert_relative_eq!(w.plane().normal.z, 1.0);
        assert_relative_eq!(w.plane().dist, 0.0);
        assert_relative_eq!(w.area(), 16.0);
        assert_eq!(w.center(), Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn chop_both_halves_rebuild_the_area() {
        let w = unit_square();
        let plane = Plane::from_point_normal(Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.3, 0.0))
            .unwrap();
        let front = w.chop(&plane).unwrap().unwrap();
        let back = w.chop(&-plane).unwrap().unwrap();
        assert_relative_eq!(front.area() + back.area(), w.area(), epsilon = 1e-3);
        assert_eq!(front.plane(), w.plane());
    }

    #[test]
    fn chop_keeps_or_drops_whole_windings() {
        let w = unit_square();
        assert_eq!(w.chop(&Plane::axial(0, -1.0, true)).unwrap(), Some(w.clone()));
        assert!(w.chop(&Plane::axial(0, 5.0, true)).unwrap().is_none());
        // Coplanar windings have nothing strictly in front.
        assert!(w.chop(&Plane::axial(2, 0.0, true)).unwrap().is_none());
    }

    #[test]
    fn clip_epsilon_splits_on_axial_plane() {
        let w = unit_square();
        let (front, back) = w.clip_epsilon(&Plane::axial(0, 1.0, true), 0.001).unwrap();
        let front = front.unwrap();
        let back = back.unwrap();
        assert_relative_eq!(front.area(), 12.0, epsilon = 1e-4);
        assert_relative_eq!(back.area(), 4.0, epsilon = 1e-4);
        assert!(front.points().iter().all(|p| p.x >= 1.0));
        assert!(back.points().iter().all(|p| p.x <= 1.0));
    }

    #[test]
    fn clip_epsilon_coplanar_goes_back() {
        let w = unit_square();
        let (front, back) = w.clip_epsilon(&Plane::axial(2, 0.0, true), 0.001).unwrap();
        assert!(front.is_none());
        assert_eq!(back, Some(w));
    }

    #[test]
    fn plane_side_classification() {
        let w = unit_square();
        assert_eq!(w.plane_side(&Plane::axial(0, -1.0, true)), WindingSide::Front);
        assert_eq!(w.plane_side(&Plane::axial(0, 5.0, true)), WindingSide::Back);
        assert_eq!(w.plane_side(&Plane::axial(0, 2.0, true)), WindingSide::Cross);
        assert_eq!(w.plane_side(&Plane::axial(2, 0.0, true)), WindingSide::On);
    }

    #[test]
    fn base_winding_lies_on_plane_and_matches_normal() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 3.0, 0.0), Vec3::new(0.2, 1.0, 0.1))
            .unwrap();
        let w = Winding::base_for_plane(&plane);
        for p in w.points() {
            assert!(plane.distance(*p).abs() < 0.05);
        }
        let computed = Winding::new(w.points().to_vec()).unwrap().plane();
        assert!(computed.normal.dot(plane.normal) > 0.999);
    }

    #[test]
    fn tiny_and_reversed() {
        let sliver = Winding::new(vec![
            Vec3::ZERO,
            Vec3::new(0.01, 0.0, 0.0),
            Vec3::new(0.01, 0.01, 0.0),
        ])
        .unwrap();
        assert!(sliver.is_tiny());
        let w = unit_square();
        assert!(!w.is_tiny());
        let r = w.reversed();
        assert_relative_eq!(r.plane().normal.z, -1.0);
        assert_relative_eq!(r.area(), w.area());
    }

    /// Regular polygon in the XY plane with a vertex at `(radius, 0, 0)`.
    fn regular(n: usize, radius: f32) -> Vec<Vec3> {
        (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Vec3::new(a.cos() * radius, a.sin() * radius, 0.0)
            })
            .collect()
    }

    #[test]
    fn point_limit_is_an_error_not_a_panic() {
        assert!(Winding::new(regular(MAX_WINDING_POINTS + 1, 10.0)).is_none());

        let full = Winding::new(regular(MAX_WINDING_POINTS, 10.0)).unwrap();
        // Cutting off one vertex trades it for two new ones.
        let cut = Plane::axial(0, 9.98, false);
        assert!(matches!(full.chop(&cut), Err(Error::Invariant(_))));
        assert!(matches!(full.clip_epsilon(&cut, 0.001), Err(Error::Invariant(_))));

        let below = Winding::new(regular(MAX_WINDING_POINTS - 1, 10.0)).unwrap();
        let kept = below.chop(&cut).unwrap().unwrap();
        assert_eq!(kept.len(), MAX_WINDING_POINTS);
    }
}
