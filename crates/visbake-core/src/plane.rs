//! Plane representation and point classification.

use std::ops::Neg;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::constants::ON_EPSILON;

/// Which side of a plane a point lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    /// Point is in front of the plane (positive side of normal)
    Front,
    /// Point is behind the plane (negative side of normal)
    Back,
    /// Point lies on the plane (within epsilon tolerance)
    On,
}

/// A plane in 3D space, represented as `normal · point = dist`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Distance from the origin along the normal
    pub dist: f32,
}

impl Plane {
    /// Creates a plane from a unit normal and a distance.
    #[inline]
    pub const fn new(normal: Vec3, dist: f32) -> Self {
        Self { normal, dist }
    }

    /// Creates a plane through `point` with the given normal (normalized here).
    ///
    /// Returns `None` for a zero-length normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Self {
            normal,
            dist: normal.dot(point),
        })
    }

    /// Plane through three points; the normal follows `(b - a) × (c - a)`.
    ///
    /// Returns `None` if the points are collinear.
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Option<Self> {
        Self::from_point_normal(a, (b - a).cross(c - a))
    }

    /// Axis-aligned plane `coord[axis] = dist` facing the positive or negative axis.
    pub fn axial(axis: usize, dist: f32, positive: bool) -> Self {
        let mut normal = Vec3::ZERO;
        normal[axis] = 1.0;
        if positive {
            Self { normal, dist }
        } else {
            Self {
                normal: -normal,
                dist: -dist,
            }
        }
    }

    /// Signed distance from `point` to the plane.
    #[inline]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.dist
    }

    /// Classify a point with the default `ON_EPSILON`.
    #[inline]
    pub fn classify(&self, point: Vec3) -> PlaneSide {
        self.classify_with_epsilon(point, ON_EPSILON)
    }

    /// Classify a point with a custom epsilon.
    pub fn classify_with_epsilon(&self, point: Vec3, epsilon: f32) -> PlaneSide {
        let d = self.distance(point);
        if d > epsilon {
            PlaneSide::Front
        } else if d < -epsilon {
            PlaneSide::Back
        } else {
            PlaneSide::On
        }
    }

    /// True if the normal is aligned with one of the world axes.
    pub fn is_axial(&self) -> bool {
        let n = self.normal.abs();
        n.x == 1.0 || n.y == 1.0 || n.z == 1.0
    }

    /// Returns the plane facing the opposite direction.
    #[inline]
    pub fn flipped(&self) -> Self {
        -*self
    }

    /// True if both planes describe the same oriented plane within tolerance.
    pub fn approx_eq(&self, other: &Plane, normal_epsilon: f32, dist_epsilon: f32) -> bool {
        (self.normal - other.normal).abs().max_element() < normal_epsilon
            && (self.dist - other.dist).abs() < dist_epsilon
    }
}

impl Neg for Plane {
    type Output = Plane;

    fn neg(self) -> Plane {
        Plane {
            normal: -self.normal,
            dist: -self.dist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_from_points_follows_right_hand_rule() {
        let plane = Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::Y).unwrap();
        assert_eq!(plane.normal, Vec3::Z);
        assert_eq!(plane.dist, 0.0);
        assert!(Plane::from_points(Vec3::ZERO, Vec3::X, Vec3::X * 2.0).is_none());
    }

    #[test]
    fn classify_respects_epsilon() {
        let plane = Plane::axial(0, 1.0, true);
        assert_eq!(plane.classify(Vec3::new(2.0, 0.0, 0.0)), PlaneSide::Front);
        assert_eq!(plane.classify(Vec3::new(0.0, 0.0, 0.0)), PlaneSide::Back);
        assert_eq!(plane.classify(Vec3::new(1.001, 0.0, 0.0)), PlaneSide::On);
    }

    #[test]
    fn negated_axial_plane() {
        let plane = Plane::axial(2, 3.0, false);
        assert_eq!(plane.normal, -Vec3::Z);
        assert_eq!(plane.dist, -3.0);
        assert!(plane.is_axial());
        assert!(plane.flipped().approx_eq(&Plane::axial(2, 3.0, true), 1e-6, 1e-6));
        assert!(plane.distance(Vec3::new(0.0, 0.0, 1.0)) > 0.0);
    }
}
