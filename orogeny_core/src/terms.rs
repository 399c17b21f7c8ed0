// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reusable constraint and objective terms.
//!
//! Each builder returns a closure suitable for
//! [`SpatialLayout::add_constraint`](crate::layout::SpatialLayout::add_constraint)
//! or [`SpatialLayout::add_objective`](crate::layout::SpatialLayout::add_objective).
//! Constraint terms return a violation that is `0` when satisfied; objective
//! terms return a cost.
//!
//! ```ignore
//! let layout = adapter.create_layout("panel");
//! layout
//!     .add_constraint(1.0, terms::within_outer_bounds(0.0))
//!     .add_constraint(1.0, terms::max_occlusion(0.05))
//!     .add_objective(1.0, terms::maximize_visual_area());
//! ```

use nalgebra::{UnitQuaternion, Vector3};

use crate::bindings::NodeBindings;
use crate::layout::LayoutContext;

/// How far the node's layout bounds poke out of its outer bounds, summed
/// over all six faces, beyond `tolerance` meters.
///
/// Nodes without an outer context are always satisfied.
pub fn within_outer_bounds<B: NodeBindings>(
    tolerance: f64,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| {
        let state = ctx.state();
        let outer = state.outer_bounds(ctx.system);
        if outer.is_empty() {
            return 0.0;
        }
        let inner = state.layout_bounds(ctx.system);
        let below = (outer.min - inner.min).map(|d| d.max(0.0));
        let above = (inner.max - outer.max).map(|d| d.max(0.0));
        (below.sum() + above.sum() - tolerance).max(0.0)
    }
}

/// Log-ratio distance between the node's visual aspect ratio and `target`,
/// beyond `tolerance`.
pub fn aspect_ratio<B: NodeBindings>(
    target: f64,
    tolerance: f64,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| {
        let aspect = ctx.state().visual_frustum(ctx.system).aspect_ratio();
        ((aspect / target).ln().abs() - tolerance).max(0.0)
    }
}

/// How much more of the node is covered by nearer nodes than `limit`.
pub fn max_occlusion<B: NodeBindings>(
    limit: f64,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| (ctx.state().occluded_percent(ctx.system) - limit).max(0.0)
}

/// Relative shortfall of the node's visual diagonal below `degrees`.
pub fn min_visual_size<B: NodeBindings>(
    degrees: f64,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| {
        let diagonal = ctx.state().visual_frustum(ctx.system).diagonal_degrees();
        ((degrees - diagonal) / degrees).max(0.0)
    }
}

/// Angle in radians between the node's local orientation and `target`.
pub fn pull_orientation<B: NodeBindings>(
    target: UnitQuaternion<f64>,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| {
        let orientation = ctx
            .sample
            .orientation
            .unwrap_or_else(|| ctx.state().local().orientation);
        orientation.angle_to(&target)
    }
}

/// Distance from the layout center to `target`, in layout space.
pub fn pull_center<B: NodeBindings>(
    target: Vector3<f64>,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| (ctx.state().layout_center(ctx.system) - target).norm()
}

/// Distance from the layout size to `target`.
pub fn pull_size<B: NodeBindings>(
    target: Vector3<f64>,
) -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| (ctx.state().layout_size(ctx.system) - target).norm()
}

/// Angle in radians between the node's local `+z` axis and the direction
/// toward the view.
pub fn align_to_view<B: NodeBindings>() -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| {
        let toward_view = ctx.state().relative_view_position(ctx.system);
        if toward_view.norm() == 0.0 {
            return 0.0;
        }
        Vector3::z().angle(&toward_view)
    }
}

/// Negative angular area, in square degrees.
pub fn maximize_visual_area<B: NodeBindings>() -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static
{
    move |ctx: &LayoutContext<'_, B>| {
        let frustum = ctx.state().visual_frustum(ctx.system);
        -(frustum.horizontal_degrees() * frustum.vertical_degrees())
    }
}

/// Total overlap with other adaptive nodes, in front and behind.
pub fn minimize_occlusion<B: NodeBindings>() -> impl Fn(&LayoutContext<'_, B>) -> f64 + 'static {
    move |ctx: &LayoutContext<'_, B>| {
        let occlusion = ctx.state().occlusion(ctx.system);
        occlusion.occluding + occlusion.occluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Box3;
    use crate::layout::LayoutSample;
    use crate::system::System;
    use crate::testing::{NodeId, TestScene};
    use nalgebra::Matrix4;

    fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    fn panel(half: f64) -> Box3 {
        Box3::new(Vector3::new(-half, -half, 0.0), Vector3::new(half, half, 0.0))
    }

    fn eval<F>(sys: &System<TestScene>, node: NodeId, term: F) -> f64
    where
        F: Fn(&LayoutContext<'_, TestScene>) -> f64,
    {
        let adapter = sys.adapter(node);
        let sample = LayoutSample::default();
        let ctx = LayoutContext {
            system: sys,
            adapter: &adapter,
            sample: &sample,
        };
        term(&ctx)
    }

    #[test]
    fn facing_panel_is_aligned() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let node = scene.add(None, translation(0.0, 0.0, -2.0), panel(0.5));
        let sys = System::new(view, scene);

        let angle = eval(&sys, node, align_to_view());
        assert!(angle.abs() < 1e-9, "facing the view, got {angle}");
    }

    #[test]
    fn turned_panel_is_misaligned() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let turned = translation(0.0, 0.0, -2.0)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.5).to_homogeneous();
        let node = scene.add(None, turned, panel(0.5));
        let sys = System::new(view, scene);

        let angle = eval(&sys, node, align_to_view());
        assert!((angle - 0.5).abs() < 1e-9, "half a radian, got {angle}");
    }

    #[test]
    fn visual_size_shortfall() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let node = scene.add(None, translation(0.0, 0.0, -10.0), panel(0.1));
        let sys = System::new(view, scene);

        let small = eval(&sys, node, min_visual_size(30.0));
        assert!(small > 0.9, "a tiny panel is far below 30 degrees, got {small}");
        let met = eval(&sys, node, min_visual_size(0.1));
        assert_eq!(met, 0.0, "above the minimum");
    }

    #[test]
    fn visual_area_is_negative() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let near = scene.add(None, translation(0.0, 0.0, -2.0), panel(0.5));
        let far = scene.add(None, translation(0.0, 0.0, -8.0), panel(0.5));
        let sys = System::new(view, scene);

        let near_cost = eval(&sys, near, maximize_visual_area());
        let far_cost = eval(&sys, far, maximize_visual_area());
        assert!(near_cost < far_cost, "nearer looks bigger: {near_cost} vs {far_cost}");
        assert!(far_cost < 0.0, "area is a negative cost");
    }

    #[test]
    fn outer_bounds_overhang() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let root = scene.add(None, translation(0.0, 0.0, -3.0), panel(1.0));
        let inside = scene.add(Some(root), Matrix4::identity(), panel(0.5));
        let outside = scene.add(Some(root), translation(1.0, 0.0, 0.0), panel(0.5));
        let sys = System::new(view, scene);
        let _ = sys.adapter(inside);
        let _ = sys.adapter(outside);

        assert_eq!(eval(&sys, inside, within_outer_bounds(0.0)), 0.0, "contained");
        let overhang = eval(&sys, outside, within_outer_bounds(0.0));
        assert!((overhang - 0.5).abs() < 1e-6, "half a meter out, got {overhang}");
        assert_eq!(eval(&sys, outside, within_outer_bounds(1.0)), 0.0, "tolerated");
    }

    #[test]
    fn pulls_measure_distance() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let node = scene.add(None, translation(0.0, 0.0, -3.0), panel(0.5));
        let sys = System::new(view, scene);

        let center = eval(&sys, node, pull_center(Vector3::new(0.0, 0.0, -3.0)));
        assert!(center < 1e-9, "already centered, got {center}");
        let size = eval(&sys, node, pull_size(Vector3::new(1.0, 1.0, 0.0)));
        assert!(size < 1e-6, "already sized, got {size}");
        let turn = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.25);
        let angle = eval(&sys, node, pull_orientation(turn));
        assert!((angle - 0.25).abs() < 1e-9, "quarter radian, got {angle}");
    }

    #[test]
    fn square_panel_has_unit_aspect() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let node = scene.add(None, translation(0.0, 0.0, -3.0), panel(0.5));
        let sys = System::new(view, scene);

        let square = eval(&sys, node, aspect_ratio(1.0, 0.01));
        assert_eq!(square, 0.0, "square within tolerance");
        let wide = eval(&sys, node, aspect_ratio(2.0, 0.0));
        assert!((wide - 2.0_f64.ln()).abs() < 1e-3, "log ratio, got {wide}");
    }
}
