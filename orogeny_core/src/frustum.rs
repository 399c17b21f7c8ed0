// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Perspective view frustums in angular coordinates.
//!
//! A [`ViewFrustum`] describes a viewing volume by the angles of its four
//! side planes (degrees, measured from the view's forward axis) and the
//! distances of its near and far planes (meters). The same type describes
//! both the camera's full field of view and the *visual frustum* of a single
//! node: the angular footprint of its projected bounds plus its depth range.
//!
//! Views look down their local `-z` axis with `+y` up, and normalized device
//! coordinates span `[-1, 1]` on every axis with `-1` at the near plane.

use kurbo::{Point, Rect};
use nalgebra::{Matrix4, Vector3};

use crate::bounds::Box3;
use crate::transform::transform_point;

/// An angular perspective frustum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewFrustum {
    /// Angle of the left plane, in degrees (negative is left of center).
    pub left_degrees: f64,
    /// Angle of the right plane, in degrees.
    pub right_degrees: f64,
    /// Angle of the bottom plane, in degrees (negative is below center).
    pub bottom_degrees: f64,
    /// Angle of the top plane, in degrees.
    pub top_degrees: f64,
    /// Distance to the near plane, in meters.
    pub near_meters: f64,
    /// Distance to the far plane, in meters.
    pub far_meters: f64,
}

impl Default for ViewFrustum {
    /// A 40°×30° field of view spanning 0.5 m to 1 km.
    fn default() -> Self {
        Self::new(-20.0, 20.0, -15.0, 15.0, 0.5, 1000.0)
    }
}

impl ViewFrustum {
    /// A frustum with zero extent. Overlaps nothing.
    pub const EMPTY: Self = Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);

    /// Creates a frustum from plane angles (degrees) and depths (meters).
    #[inline]
    #[must_use]
    pub const fn new(
        left_degrees: f64,
        right_degrees: f64,
        bottom_degrees: f64,
        top_degrees: f64,
        near_meters: f64,
        far_meters: f64,
    ) -> Self {
        Self {
            left_degrees,
            right_degrees,
            bottom_degrees,
            top_degrees,
            near_meters,
            far_meters,
        }
    }

    /// Reconstructs a frustum from a perspective projection matrix.
    ///
    /// With `ndc` set, only that sub-box of normalized device coordinates is
    /// considered: its x/y extents become the side planes and its z extents
    /// the near/far planes. This is how a node's projected screen bounds
    /// become its visual frustum. An empty `ndc` box, or a singular
    /// projection, yields [`ViewFrustum::EMPTY`].
    #[must_use]
    pub fn from_perspective_projection(projection: &Matrix4<f64>, ndc: Option<&Box3>) -> Self {
        let full = Box3::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
        let ndc = ndc.copied().unwrap_or(full);
        if ndc.is_empty() {
            return Self::EMPTY;
        }
        let Some(inverse) = projection.try_inverse() else {
            return Self::EMPTY;
        };

        // Horizontal angles do not depend on y for a perspective projection
        // (and vice versa), so sample along the center lines.
        let center = ndc.center();
        let angle = |x: f64, y: f64| {
            let p = transform_point(&inverse, &Vector3::new(x, y, -1.0));
            (p.x.atan2(-p.z).to_degrees(), p.y.atan2(-p.z).to_degrees())
        };
        let depth = |z: f64| -transform_point(&inverse, &Vector3::new(center.x, center.y, z)).z;

        let (left, _) = angle(ndc.min.x, center.y);
        let (right, _) = angle(ndc.max.x, center.y);
        let (_, bottom) = angle(center.x, ndc.min.y);
        let (_, top) = angle(center.x, ndc.max.y);
        Self::new(left, right, bottom, top, depth(ndc.min.z), depth(ndc.max.z))
    }

    /// Horizontal field of view, in degrees.
    #[inline]
    #[must_use]
    pub fn horizontal_degrees(&self) -> f64 {
        self.right_degrees - self.left_degrees
    }

    /// Vertical field of view, in degrees.
    #[inline]
    #[must_use]
    pub fn vertical_degrees(&self) -> f64 {
        self.top_degrees - self.bottom_degrees
    }

    /// Diagonal field of view, in degrees.
    #[must_use]
    pub fn diagonal_degrees(&self) -> f64 {
        self.horizontal_degrees().hypot(self.vertical_degrees())
    }

    /// Angular center `(x, y)`, in degrees.
    #[must_use]
    pub fn center_degrees(&self) -> Point {
        self.angular_rect().center()
    }

    /// Horizontal over vertical extent. Zero when the frustum is empty.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.horizontal_degrees() / self.vertical_degrees()
        }
    }

    /// Depth range, in meters.
    #[inline]
    #[must_use]
    pub fn depth_meters(&self) -> f64 {
        self.far_meters - self.near_meters
    }

    /// Returns `true` if the angular footprint has no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let finite = [
            self.left_degrees,
            self.right_degrees,
            self.bottom_degrees,
            self.top_degrees,
        ]
        .iter()
        .all(|v| v.is_finite());
        !finite || self.horizontal_degrees() <= 0.0 || self.vertical_degrees() <= 0.0
    }

    /// The angular footprint as a rectangle (`x` horizontal, `y` vertical).
    #[must_use]
    pub fn angular_rect(&self) -> Rect {
        Rect::new(
            self.left_degrees,
            self.bottom_degrees,
            self.right_degrees,
            self.top_degrees,
        )
    }

    /// The fraction of this frustum's angular footprint covered by `other`,
    /// in `[0, 1]`.
    ///
    /// Depth is ignored. Returns `0` if either frustum is empty.
    #[must_use]
    pub fn overlap_percent(&self, other: &Self) -> f64 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }
        let mine = self.angular_rect();
        let shared = mine.intersect(other.angular_rect());
        (shared.area() / mine.area()).clamp(0.0, 1.0)
    }

    /// Equality within `epsilon_degrees` for angles and `epsilon_meters` for
    /// depths.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon_degrees: f64, epsilon_meters: f64) -> bool {
        (self.left_degrees - other.left_degrees).abs() <= epsilon_degrees
            && (self.right_degrees - other.right_degrees).abs() <= epsilon_degrees
            && (self.bottom_degrees - other.bottom_degrees).abs() <= epsilon_degrees
            && (self.top_degrees - other.top_degrees).abs() <= epsilon_degrees
            && (self.near_meters - other.near_meters).abs() <= epsilon_meters
            && (self.far_meters - other.far_meters).abs() <= epsilon_meters
    }

    /// The OpenGL-style perspective projection matrix for this frustum.
    #[must_use]
    #[rustfmt::skip]
    pub fn perspective_projection_matrix(&self) -> Matrix4<f64> {
        let n = self.near_meters;
        let f = self.far_meters;
        let l = n * self.left_degrees.to_radians().tan();
        let r = n * self.right_degrees.to_radians().tan();
        let b = n * self.bottom_degrees.to_radians().tan();
        let t = n * self.top_degrees.to_radians().tan();
        Matrix4::new(
            2.0 * n / (r - l), 0.0,               (r + l) / (r - l),  0.0,
            0.0,               2.0 * n / (t - b), (t + b) / (t - b),  0.0,
            0.0,               0.0,               -(f + n) / (f - n), -2.0 * f * n / (f - n),
            0.0,               0.0,               -1.0,               0.0,
        )
    }

    /// Converts a point in normalized screen coordinates to angular
    /// coordinates (degrees) within this frustum.
    #[must_use]
    pub fn screen_to_visual(&self, screen: Point) -> Point {
        let across = |ndc: f64, lo: f64, hi: f64| {
            let (lo, hi) = (lo.to_radians().tan(), hi.to_radians().tan());
            let s = (ndc + 1.0) * 0.5;
            (lo + (hi - lo) * s).atan().to_degrees()
        };
        Point::new(
            across(screen.x, self.left_degrees, self.right_degrees),
            across(screen.y, self.bottom_degrees, self.top_degrees),
        )
    }

    /// Converts angular coordinates (degrees) to normalized screen
    /// coordinates within this frustum.
    #[must_use]
    pub fn visual_to_screen(&self, visual: Point) -> Point {
        let across = |degrees: f64, lo: f64, hi: f64| {
            let (lo, hi) = (lo.to_radians().tan(), hi.to_radians().tan());
            let t = degrees.to_radians().tan();
            (t - lo) / (hi - lo) * 2.0 - 1.0
        };
        Point::new(
            across(visual.x, self.left_degrees, self.right_degrees),
            across(visual.y, self.bottom_degrees, self.top_degrees),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EPS_DEG: f64 = 1e-9;
    const EPS_M: f64 = 1e-6;

    #[test]
    fn projection_matrix_round_trips() {
        let f = ViewFrustum::new(-30.0, 20.0, -10.0, 25.0, 0.1, 100.0);
        let back = ViewFrustum::from_perspective_projection(&f.perspective_projection_matrix(), None);
        assert!(back.approx_eq(&f, EPS_DEG, EPS_M), "got {back:?}");
    }

    #[test]
    fn sub_box_of_ndc_narrows_the_frustum() {
        let f = ViewFrustum::default();
        let half = Box3::new(Vector3::new(0.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
        let right_half = ViewFrustum::from_perspective_projection(
            &f.perspective_projection_matrix(),
            Some(&half),
        );
        assert!(right_half.left_degrees.abs() < EPS_DEG, "center line");
        assert!((right_half.right_degrees - 20.0).abs() < EPS_DEG, "right edge");
        assert!((right_half.top_degrees - 15.0).abs() < EPS_DEG, "top edge");
    }

    #[test]
    fn empty_ndc_box_gives_empty_frustum() {
        let f = ViewFrustum::default();
        let v = ViewFrustum::from_perspective_projection(
            &f.perspective_projection_matrix(),
            Some(&Box3::EMPTY),
        );
        assert!(v.is_empty(), "empty");
    }

    #[test]
    fn identical_frustums_fully_overlap() {
        let f = ViewFrustum::default();
        assert!((f.overlap_percent(&f) - 1.0).abs() < 1e-12, "full overlap");
    }

    #[test]
    fn half_covered_frustum() {
        let a = ViewFrustum::new(-10.0, 10.0, -10.0, 10.0, 1.0, 2.0);
        let b = ViewFrustum::new(0.0, 30.0, -30.0, 30.0, 3.0, 4.0);
        assert!((a.overlap_percent(&b) - 0.5).abs() < 1e-12, "half of a");
        assert!((b.overlap_percent(&a) - (200.0 / 1800.0)).abs() < 1e-12, "part of b");
    }

    #[test]
    fn disjoint_and_degenerate_frustums_do_not_overlap() {
        let a = ViewFrustum::new(-10.0, -5.0, -10.0, 10.0, 1.0, 2.0);
        let b = ViewFrustum::new(5.0, 10.0, -10.0, 10.0, 1.0, 2.0);
        assert_eq!(a.overlap_percent(&b), 0.0, "disjoint");
        assert_eq!(a.overlap_percent(&ViewFrustum::EMPTY), 0.0, "empty other");
        assert_eq!(ViewFrustum::EMPTY.overlap_percent(&a), 0.0, "empty self");
    }

    #[test]
    fn screen_edges_map_to_plane_angles() {
        let f = ViewFrustum::new(-30.0, 20.0, -10.0, 25.0, 0.1, 100.0);
        let lo = f.screen_to_visual(Point::new(-1.0, -1.0));
        let hi = f.screen_to_visual(Point::new(1.0, 1.0));
        assert!((lo.x + 30.0).abs() < EPS_DEG && (lo.y + 10.0).abs() < EPS_DEG, "{lo:?}");
        assert!((hi.x - 20.0).abs() < EPS_DEG && (hi.y - 25.0).abs() < EPS_DEG, "{hi:?}");

        let p = Point::new(0.25, -0.4);
        let back = f.visual_to_screen(f.screen_to_visual(p));
        assert!((back - p).hypot() < 1e-12, "inverse conversion, got {back:?}");
    }

    #[test]
    fn derived_extents() {
        let f = ViewFrustum::default();
        assert_eq!(f.horizontal_degrees(), 40.0, "horizontal");
        assert_eq!(f.vertical_degrees(), 30.0, "vertical");
        assert_eq!(f.diagonal_degrees(), 50.0, "diagonal");
        assert_eq!(f.center_degrees(), Point::ZERO, "centered");
    }
}
