// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Axis-aligned 3D bounding boxes.

use nalgebra::{Matrix4, Point3, Vector3};

/// An axis-aligned box in some 3D coordinate space.
///
/// A box is *empty* when `max < min` on any axis. The canonical empty box
/// ([`Box3::EMPTY`]) has `min = +∞` and `max = −∞`, which makes it the
/// identity element of [`union`](Self::union). A box whose `min == max` is a
/// point and is **not** empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
    /// Minimum corner.
    pub min: Vector3<f64>,
    /// Maximum corner.
    pub max: Vector3<f64>,
}

impl Default for Box3 {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Box3 {
    /// The empty box.
    pub const EMPTY: Self = Self {
        min: Vector3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
        max: Vector3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
    };

    /// Creates a box from two corners.
    #[inline]
    #[must_use]
    pub const fn new(min: Vector3<f64>, max: Vector3<f64>) -> Self {
        Self { min, max }
    }

    /// Creates a box centered on `center` with the given full extents.
    #[inline]
    #[must_use]
    pub fn from_center_and_size(center: Vector3<f64>, size: Vector3<f64>) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Returns `true` if `max < min` on any axis.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Returns `true` if the box is empty or all its coordinates are finite.
    ///
    /// Any `NaN` coordinate makes a box invalid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let nan = self.min.iter().chain(self.max.iter()).any(|v| v.is_nan());
        !nan && (self.is_empty() || self.is_finite())
    }

    /// Returns `true` if every coordinate is finite.
    #[inline]
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.iter().chain(self.max.iter()).all(|v| v.is_finite())
    }

    /// The center point. Zero for an empty box.
    #[must_use]
    pub fn center(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            (self.min + self.max) * 0.5
        }
    }

    /// The extents along each axis. Zero for an empty box.
    #[must_use]
    pub fn size(&self) -> Vector3<f64> {
        if self.is_empty() {
            Vector3::zeros()
        } else {
            self.max - self.min
        }
    }

    /// The smallest box containing both boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// The smallest box containing this box and `point`.
    #[must_use]
    pub fn expand_by_point(&self, point: &Vector3<f64>) -> Self {
        Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    /// Returns `true` if `point` lies inside or on the boundary.
    #[must_use]
    pub fn contains_point(&self, point: &Vector3<f64>) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// The bounding box of the eight corners after transforming them by `m`.
    ///
    /// `m` is treated as a homogeneous transform, so projective matrices
    /// divide by `w`. An empty box stays empty.
    #[must_use]
    pub fn transformed(&self, m: &Matrix4<f64>) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        let mut out = Self::EMPTY;
        for corner in 0..8 {
            let p = Point3::new(
                if corner & 1 == 0 { self.min.x } else { self.max.x },
                if corner & 2 == 0 { self.min.y } else { self.max.y },
                if corner & 4 == 0 { self.min.z } else { self.max.z },
            );
            out = out.expand_by_point(&m.transform_point(&p).coords);
        }
        out
    }

    /// Re-centers the box with every axis of extent `<= epsilon` widened to
    /// `10 * epsilon`.
    ///
    /// The widened axis keeps the sign of its original extent (positive when
    /// zero). Empty boxes are returned unchanged.
    #[must_use]
    pub fn inflated(&self, epsilon: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_center_and_size(self.center(), inflate_size(self.size(), epsilon))
    }

    /// Linear interpolation of both corners.
    #[must_use]
    pub fn lerp(&self, to: &Self, t: f64) -> Self {
        Self {
            min: self.min.lerp(&to.min, t),
            max: self.max.lerp(&to.max, t),
        }
    }
}

/// Widens every axis of `size` whose magnitude is `<= epsilon` to
/// `10 * epsilon`, preserving its sign (positive when zero).
#[must_use]
pub fn inflate_size(mut size: Vector3<f64>, epsilon: f64) -> Vector3<f64> {
    for v in size.iter_mut() {
        if v.abs() <= epsilon {
            let sign = if *v < 0.0 { -1.0 } else { 1.0 };
            *v = sign * epsilon * 10.0;
        }
    }
    size
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Box3 {
        Box3::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn empty_box_is_union_identity() {
        let b = unit();
        assert_eq!(Box3::EMPTY.union(&b), b, "empty ∪ b == b");
        assert!(Box3::EMPTY.is_empty(), "EMPTY must be empty");
        assert!(Box3::EMPTY.is_valid(), "EMPTY is valid");
        assert_eq!(Box3::EMPTY.size(), Vector3::zeros(), "empty size is zero");
    }

    #[test]
    fn point_box_is_not_empty() {
        let p = Box3::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 2.0, 3.0));
        assert!(!p.is_empty(), "a point box is not empty");
    }

    #[test]
    fn nan_box_is_invalid() {
        let mut b = unit();
        b.max.y = f64::NAN;
        assert!(!b.is_valid(), "NaN coordinates are invalid");
    }

    #[test]
    fn transformed_by_translation_and_scale() {
        let m = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0))
            * Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 2.0, 2.0));
        let t = unit().transformed(&m);
        assert_eq!(t.min, Vector3::new(1.0, 2.0, 3.0), "min corner");
        assert_eq!(t.max, Vector3::new(3.0, 4.0, 5.0), "max corner");
    }

    #[test]
    fn transformed_empty_stays_empty() {
        let m = Matrix4::new_translation(&Vector3::new(1.0, 0.0, 0.0));
        assert!(Box3::EMPTY.transformed(&m).is_empty(), "still empty");
    }

    #[test]
    fn inflation_widens_degenerate_axes_around_center() {
        let eps = 1e-10;
        let flat = Box3::new(Vector3::new(-1.0, -2.0, 5.0), Vector3::new(1.0, 2.0, 5.0));
        let inflated = flat.inflated(eps);
        let size = inflated.size();
        assert!(size.z >= 10.0 * eps * (1.0 - 1e-6), "z widened, got {}", size.z);
        assert_eq!(size.x, 2.0, "x untouched");
        assert_eq!(size.y, 4.0, "y untouched");
        let center = inflated.center();
        assert!((center - flat.center()).norm() < 1e-12, "center preserved");
    }

    #[test]
    fn inflate_size_preserves_sign() {
        let s = inflate_size(Vector3::new(-1e-12, 0.0, 3.0), 1e-10);
        assert!(s.x < 0.0, "negative axis stays negative");
        assert!(s.y > 0.0, "zero axis becomes positive");
        assert_eq!(s.z, 3.0, "large axis untouched");
    }
}
