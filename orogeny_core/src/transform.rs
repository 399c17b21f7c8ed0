// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Helpers for column-major 4×4 affine transforms.
//!
//! Matrices are `nalgebra::Matrix4<f64>` and act on column vectors, so
//! `parent * local` maps local coordinates into the parent's space.

use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, UnitQuaternion, Vector3};

/// A transform split into translation, rotation, and per-axis scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    /// Translation.
    pub position: Vector3<f64>,
    /// Rotation.
    pub orientation: UnitQuaternion<f64>,
    /// Per-axis scale. A negative determinant is folded into `x`.
    pub scale: Vector3<f64>,
}

impl Default for Decomposed {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

/// Builds `translation * rotation * scale`.
#[must_use]
pub fn compose(
    position: &Vector3<f64>,
    orientation: &UnitQuaternion<f64>,
    scale: &Vector3<f64>,
) -> Matrix4<f64> {
    Matrix4::new_translation(position)
        * orientation.to_homogeneous()
        * Matrix4::new_nonuniform_scaling(scale)
}

/// Splits an affine transform into position, orientation, and scale.
///
/// Projective components are ignored. Axes with (near) zero scale contribute
/// nothing to the recovered rotation.
#[must_use]
pub fn decompose(m: &Matrix4<f64>) -> Decomposed {
    let position = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let linear: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();

    let mut scale = Vector3::new(
        linear.column(0).norm(),
        linear.column(1).norm(),
        linear.column(2).norm(),
    );
    if linear.determinant() < 0.0 {
        scale.x = -scale.x;
    }

    let mut rotation = linear;
    for (i, s) in scale.iter().enumerate() {
        if s.abs() > f64::EPSILON {
            rotation.column_mut(i).unscale_mut(*s);
        } else {
            rotation.column_mut(i).fill(0.0);
        }
    }
    let orientation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&rotation));

    Decomposed {
        position,
        orientation,
        scale,
    }
}

/// The inverse of `m`, or the identity when `m` is singular.
#[must_use]
pub fn inverse_or_identity(m: &Matrix4<f64>) -> Matrix4<f64> {
    m.try_inverse().unwrap_or_else(Matrix4::identity)
}

/// Transforms a point by a homogeneous matrix, dividing by `w`.
#[inline]
#[must_use]
pub fn transform_point(m: &Matrix4<f64>, p: &Vector3<f64>) -> Vector3<f64> {
    m.transform_point(&Point3::from(*p)).coords
}

/// Returns `true` if every element of `m` is finite.
#[must_use]
pub fn is_finite(m: &Matrix4<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Component-wise approximate equality.
#[must_use]
pub fn approx_eq(a: &Matrix4<f64>, b: &Matrix4<f64>, epsilon: f64) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= epsilon)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::f64::consts::FRAC_PI_2;

    #[test]
    fn identity_decomposes_to_default() {
        let d = decompose(&Matrix4::identity());
        assert_eq!(d.position, Vector3::zeros(), "no translation");
        assert!(d.orientation.angle() < 1e-12, "no rotation");
        assert_eq!(d.scale, Vector3::new(1.0, 1.0, 1.0), "unit scale");
    }

    #[test]
    fn compose_then_decompose_recovers_parts() {
        let position = Vector3::new(1.0, -2.0, 3.5);
        let orientation = UnitQuaternion::from_euler_angles(0.3, -0.7, 1.1);
        let scale = Vector3::new(2.0, 0.5, 3.0);

        let d = decompose(&compose(&position, &orientation, &scale));
        assert!((d.position - position).norm() < 1e-12, "position");
        assert!(d.orientation.angle_to(&orientation) < 1e-9, "orientation");
        assert!((d.scale - scale).norm() < 1e-12, "scale");
    }

    #[test]
    fn rotation_about_z_maps_x_to_y() {
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let m = compose(&Vector3::zeros(), &q, &Vector3::new(1.0, 1.0, 1.0));
        let p = transform_point(&m, &Vector3::new(1.0, 0.0, 0.0));
        assert!((p - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-12, "got {p:?}");
    }

    #[test]
    fn singular_inverse_falls_back_to_identity() {
        let flat = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 0.0, 1.0));
        assert_eq!(inverse_or_identity(&flat), Matrix4::identity(), "fallback");
    }

    #[test]
    fn zero_scale_axis_still_decomposes_to_finite_rotation() {
        let m = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 1.0, 0.0));
        let d = decompose(&m);
        assert!(d.orientation.coords.iter().all(|v| v.is_finite()), "finite");
        assert_eq!(d.scale.z, 0.0, "zero scale kept");
    }

    #[test]
    fn perspective_point_is_divided_by_w() {
        let mut m = Matrix4::identity();
        m[(3, 3)] = 2.0;
        let p = transform_point(&m, &Vector3::new(2.0, 4.0, 6.0));
        assert_eq!(p, Vector3::new(1.0, 2.0, 3.0), "divided by w");
    }
}
