// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node layout controller.
//!
//! A [`SpatialAdapter`] opts one node into adaptive layout. It owns three
//! [`Transitionable`]s (orientation, layout bounds, opacity) that feed the
//! node's [`NodeState`](crate::state::NodeState)s, the node's candidate
//! [`SpatialLayout`]s, and the choice of which layout is active.
//!
//! Once per system update the adapter runs the optimizer over its
//! presentable layouts, picks the active one, and retargets its
//! transitionables from that layout's best sample. The transitionables
//! blend toward those targets on the following frame.

use core::cell::{Cell, RefCell};
use core::f64::consts::PI;
use core::fmt;
use std::rc::Rc;

use nalgebra::UnitQuaternion;

use crate::bindings::NodeBindings;
use crate::bounds::Box3;
use crate::layout::{LayoutSample, SpatialLayout};
use crate::metrics::SpatialMetrics;
use crate::optimizer::{OptimizerConfig, select_layout};
use crate::system::System;
use crate::transition::{TransitionConfig, TransitionError, TransitionValue, Transitionable};

/// Where an adaptive node should live in the hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TargetParent<N> {
    /// Keep the host's current parent.
    #[default]
    Inherit,
    /// The node is on its way out; it has no parent in the target state.
    Remove,
    /// Re-parent under the given node.
    Node(N),
}

/// Transition status of an adapter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AdapterStatus {
    /// Nothing is blending.
    #[default]
    Stable,
    /// Blending toward the active layout.
    Transitioning,
    /// First update that observed blending after a stable period.
    TransitionBegin,
}

type Hook<B> = Rc<dyn Fn(&System<B>, &SpatialAdapter<B>)>;

/// Layout controller for one node.
pub struct SpatialAdapter<B: NodeBindings> {
    node: B::Node,
    metrics: Rc<SpatialMetrics<B>>,
    orientation: Rc<Transitionable<UnitQuaternion<f64>>>,
    bounds: Rc<Transitionable<Box3>>,
    opacity: Rc<Transitionable<f64>>,
    parent_node: Cell<TargetParent<B::Node>>,
    all_layouts: RefCell<Vec<Rc<SpatialLayout<B>>>>,
    layouts: RefCell<Vec<Rc<SpatialLayout<B>>>>,
    active_layout: RefCell<Option<Rc<SpatialLayout<B>>>>,
    previous_layout: RefCell<Option<Rc<SpatialLayout<B>>>>,
    status: Cell<AdapterStatus>,
    previous_status: Cell<AdapterStatus>,
    candidate: Cell<Option<LayoutSample>>,
    optimize: Cell<Option<OptimizerConfig>>,
    fade_on_enter_exit: Cell<bool>,
    fade_on_pose_change: Cell<Option<f64>>,
    fade_on_layout_change: Cell<bool>,
    layout_fade_pending: Cell<bool>,
    pause_motion_on_fade: Cell<bool>,
    sync_with_parent_adapter: Cell<bool>,
    next_layout_id: Cell<u32>,
    on_pre_update: RefCell<Option<Hook<B>>>,
    on_post_update: RefCell<Option<Hook<B>>>,
}

impl<B: NodeBindings> fmt::Debug for SpatialAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialAdapter")
            .field("node", &self.node)
            .field("parent_node", &self.parent_node.get())
            .field("layouts", &self.layouts.borrow().len())
            .field(
                "active_layout",
                &self.active_layout.borrow().as_ref().map(|l| l.id()),
            )
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

fn same_layout<B: NodeBindings>(
    a: Option<&Rc<SpatialLayout<B>>>,
    b: Option<&Rc<SpatialLayout<B>>>,
) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Moves `t` toward `value`, jumping there if `t` was not yet driving
/// layout.
fn drive<T: TransitionValue>(t: &Transitionable<T>, value: T) -> Result<(), TransitionError> {
    if t.is_active() {
        t.set_target(value)
    } else {
        t.reset(value)?;
        t.set_active(true);
        Ok(())
    }
}

impl<B: NodeBindings> SpatialAdapter<B> {
    pub(crate) fn new(sys: &System<B>, node: B::Node) -> Self {
        Self {
            node,
            metrics: sys.metrics(node),
            orientation: sys.create_transitionable(UnitQuaternion::identity()),
            bounds: sys.create_transitionable(Box3::EMPTY),
            opacity: sys.create_transitionable(1.0),
            parent_node: Cell::new(TargetParent::Inherit),
            all_layouts: RefCell::new(Vec::new()),
            layouts: RefCell::new(Vec::new()),
            active_layout: RefCell::new(None),
            previous_layout: RefCell::new(None),
            status: Cell::new(AdapterStatus::Stable),
            previous_status: Cell::new(AdapterStatus::Stable),
            candidate: Cell::new(None),
            optimize: Cell::new(None),
            fade_on_enter_exit: Cell::new(false),
            fade_on_pose_change: Cell::new(None),
            fade_on_layout_change: Cell::new(false),
            layout_fade_pending: Cell::new(false),
            pause_motion_on_fade: Cell::new(false),
            sync_with_parent_adapter: Cell::new(false),
            next_layout_id: Cell::new(0),
            on_pre_update: RefCell::new(None),
            on_post_update: RefCell::new(None),
        }
    }

    /// The adapted node.
    #[inline]
    #[must_use]
    pub fn node(&self) -> B::Node {
        self.node
    }

    /// The adapted node's metrics.
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> &SpatialMetrics<B> {
        &self.metrics
    }

    /// Local orientation driver. Inactive until a layout controls it.
    #[inline]
    #[must_use]
    pub fn orientation(&self) -> &Rc<Transitionable<UnitQuaternion<f64>>> {
        &self.orientation
    }

    /// Layout-space bounds driver. Inactive until a layout controls it.
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> &Rc<Transitionable<Box3>> {
        &self.bounds
    }

    /// Opacity driver.
    #[inline]
    #[must_use]
    pub fn opacity(&self) -> &Rc<Transitionable<f64>> {
        &self.opacity
    }

    /// The target-parent override.
    #[inline]
    #[must_use]
    pub fn parent_node(&self) -> TargetParent<B::Node> {
        self.parent_node.get()
    }

    /// Overrides where the node lives in the target hierarchy.
    pub fn set_parent_node(&self, parent: TargetParent<B::Node>) {
        if self.parent_node.replace(parent) != parent {
            self.metrics.invalidate_node_states();
        }
    }

    /// The nearest ancestor's adapter.
    #[must_use]
    pub fn parent_adapter(&self, sys: &System<B>) -> Option<Rc<Self>> {
        let mut ancestor = self.metrics.parent_metrics(sys);
        while let Some(metrics) = ancestor {
            if let Some(adapter) = sys.existing_adapter(metrics.node()) {
                return Some(adapter);
            }
            ancestor = metrics.parent_metrics(sys);
        }
        None
    }

    // -- layouts ------------------------------------------------------------

    /// Every layout created by this adapter, in creation order.
    #[must_use]
    pub fn all_layouts(&self) -> Vec<Rc<SpatialLayout<B>>> {
        self.all_layouts.borrow().clone()
    }

    /// Layouts the optimizer considers, highest priority first.
    #[must_use]
    pub fn layouts(&self) -> Vec<Rc<SpatialLayout<B>>> {
        self.layouts.borrow().clone()
    }

    /// Creates a layout owned by this adapter. It is not presentable until
    /// passed to [`present`](Self::present) or
    /// [`set_layouts`](Self::set_layouts).
    pub fn create_layout(&self, name: impl Into<String>) -> Rc<SpatialLayout<B>> {
        let id = self.next_layout_id.get();
        self.next_layout_id.set(id + 1);
        let layout = Rc::new(SpatialLayout::new(name.into(), id, self.node));
        self.all_layouts.borrow_mut().push(layout.clone());
        layout
    }

    /// Appends `layout` to the presentable list, lowest priority.
    ///
    /// # Panics
    ///
    /// Panics if `layout` was created by a different adapter.
    pub fn present(&self, layout: &Rc<SpatialLayout<B>>) {
        assert!(
            layout.owner() == self.node,
            "layout belongs to another adapter"
        );
        let mut layouts = self.layouts.borrow_mut();
        if !layouts.iter().any(|l| Rc::ptr_eq(l, layout)) {
            layouts.push(layout.clone());
        }
    }

    /// Replaces the presentable list.
    ///
    /// # Panics
    ///
    /// Panics if any layout was created by a different adapter.
    pub fn set_layouts(&self, layouts: Vec<Rc<SpatialLayout<B>>>) {
        for layout in &layouts {
            assert!(
                layout.owner() == self.node,
                "layout belongs to another adapter"
            );
        }
        *self.layouts.borrow_mut() = layouts;
    }

    /// The layout currently driving the node.
    #[must_use]
    pub fn active_layout(&self) -> Option<Rc<SpatialLayout<B>>> {
        self.active_layout.borrow().clone()
    }

    /// The layout that was active before the last change.
    #[must_use]
    pub fn previous_layout(&self) -> Option<Rc<SpatialLayout<B>>> {
        self.previous_layout.borrow().clone()
    }

    /// Switches the active layout.
    ///
    /// Records the outgoing layout as previous and resets status tracking, so
    /// the next blend reports [`AdapterStatus::TransitionBegin`]. The
    /// transitionables are retargeted on the next system update. With
    /// [`fade_on_layout_change`](Self::fade_on_layout_change), switching
    /// from one layout to another starts a fade-out.
    pub fn set_active_layout(&self, layout: Option<Rc<SpatialLayout<B>>>) {
        if same_layout(self.active_layout.borrow().as_ref(), layout.as_ref()) {
            return;
        }
        if self.fade_on_layout_change.get()
            && layout.is_some()
            && self.active_layout.borrow().is_some()
        {
            self.layout_fade_pending.set(true);
        }
        let outgoing = self.active_layout.replace(layout);
        *self.previous_layout.borrow_mut() = outgoing;
        self.status.set(AdapterStatus::Stable);
        self.previous_status.set(AdapterStatus::Stable);
        self.metrics.invalidate_node_states();
    }

    // -- status -------------------------------------------------------------

    /// Status as of the last update.
    #[inline]
    #[must_use]
    pub fn status(&self) -> AdapterStatus {
        self.status.get()
    }

    /// Status as of the update before.
    #[inline]
    #[must_use]
    pub fn previous_status(&self) -> AdapterStatus {
        self.previous_status.get()
    }

    /// The least-advanced transition among the three drivers, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.orientation
            .progress()
            .min(self.bounds.progress())
            .min(self.opacity.progress())
    }

    // -- configuration ------------------------------------------------------

    /// Optimizer configuration override.
    #[must_use]
    pub fn optimize_config(&self) -> Option<OptimizerConfig> {
        self.optimize.get()
    }

    /// Sets or clears the optimizer configuration override.
    pub fn set_optimize_config(&self, config: Option<OptimizerConfig>) {
        self.optimize.set(config);
    }

    /// Sets or clears the transition override on all three drivers.
    pub fn set_transition(&self, config: Option<TransitionConfig>) {
        self.orientation.set_config(config);
        self.bounds.set_config(config);
        self.opacity.set_config(config);
    }

    /// Whether opacity fades out while the node has no active layout or is
    /// flagged for removal.
    #[must_use]
    pub fn fade_on_enter_exit(&self) -> bool {
        self.fade_on_enter_exit.get()
    }

    /// Enables or disables enter/exit fading.
    pub fn set_fade_on_enter_exit(&self, fade: bool) {
        self.fade_on_enter_exit.set(fade);
        self.opacity.set_active(self.fades());
    }

    /// The relative pose difference above which opacity dips, if enabled.
    #[must_use]
    pub fn fade_on_pose_change(&self) -> Option<f64> {
        self.fade_on_pose_change.get()
    }

    /// Dips opacity to zero while the active layout's best pose differs from
    /// the current pose by more than `relative_difference`.
    ///
    /// Bounds differ by their distance relative to their size, orientations
    /// by their angle as a fraction of a half turn. Drivers that are not yet
    /// active are ignored.
    pub fn set_fade_on_pose_change(&self, relative_difference: Option<f64>) {
        self.fade_on_pose_change.set(relative_difference);
        self.opacity.set_active(self.fades());
    }

    /// Whether opacity dips when the active layout switches.
    #[must_use]
    pub fn fade_on_layout_change(&self) -> bool {
        self.fade_on_layout_change.get()
    }

    /// Enables or disables fading out when one active layout replaces
    /// another. Opacity returns once it has reached zero.
    pub fn set_fade_on_layout_change(&self, fade: bool) {
        self.fade_on_layout_change.set(fade);
        if !fade {
            self.layout_fade_pending.set(false);
        }
        self.opacity.set_active(self.fades());
    }

    /// Whether motion waits for fade-outs.
    #[must_use]
    pub fn pause_motion_on_fade(&self) -> bool {
        self.pause_motion_on_fade.get()
    }

    /// While opacity is fading out, keeps the orientation and bounds targets
    /// where they are. Motion resumes once opacity reaches its target, so the
    /// node moves while faded rather than while visible.
    pub fn set_pause_motion_on_fade(&self, pause: bool) {
        self.pause_motion_on_fade.set(pause);
    }

    /// Whether the parent adapter is updated before this one.
    #[must_use]
    pub fn sync_with_parent_adapter(&self) -> bool {
        self.sync_with_parent_adapter.get()
    }

    /// Updates the [`parent_adapter`](Self::parent_adapter) first on every
    /// system update, so this adapter lays out against the parent's pose for
    /// the same frame. The host parent is always updated first; this also
    /// covers a [`TargetParent::Node`] override.
    pub fn set_sync_with_parent_adapter(&self, sync: bool) {
        self.sync_with_parent_adapter.set(sync);
    }

    fn fades(&self) -> bool {
        self.fade_on_enter_exit.get()
            || self.fade_on_pose_change.get().is_some()
            || self.fade_on_layout_change.get()
    }

    /// Runs `hook` at the start of every update, before the optimizer.
    pub fn on_pre_update(&self, hook: impl Fn(&System<B>, &Self) + 'static) {
        *self.on_pre_update.borrow_mut() = Some(Rc::new(hook));
    }

    /// Runs `hook` at the end of every update.
    pub fn on_post_update(&self, hook: impl Fn(&System<B>, &Self) + 'static) {
        *self.on_post_update.borrow_mut() = Some(Rc::new(hook));
    }

    // -- update -------------------------------------------------------------

    pub(crate) fn candidate(&self) -> Option<LayoutSample> {
        self.candidate.get()
    }

    /// Overrides the target state with `sample` while a layout is scored.
    pub(crate) fn set_candidate(&self, sample: Option<LayoutSample>) {
        self.candidate.set(sample);
        self.metrics.invalidate_target_state();
    }

    /// The node's unoptimized target pose, restricted to what `layout`
    /// controls.
    pub(crate) fn natural_sample(
        &self,
        sys: &System<B>,
        layout: &SpatialLayout<B>,
    ) -> LayoutSample {
        let state = self.metrics.target_state(sys);
        LayoutSample {
            orientation: layout
                .controls_orientation()
                .then(|| state.local().orientation),
            bounds: layout.controls_bounds().then(|| state.layout_bounds(sys)),
        }
    }

    pub(crate) fn update(&self, sys: &System<B>) {
        if self.sync_with_parent_adapter.get()
            && let Some(parent) = self.parent_adapter(sys)
        {
            parent.metrics().update(sys);
        }
        self.metrics.invalidate_inner_bounds(sys);
        self.metrics.invalidate_node_states();

        let hook = self.on_pre_update.borrow().clone();
        if let Some(hook) = hook {
            hook(sys, self);
        }

        let config = self.optimize.get().unwrap_or(sys.config().optimize);
        let presentable = self.layouts();
        for layout in &presentable {
            sys.optimizer().optimize(sys, self, layout, &config);
        }
        let incumbent = self.active_layout();
        let chosen = select_layout(incumbent.as_ref(), &presentable, &config);
        self.set_active_layout(chosen);

        if self.layout_fade_pending.get() && self.opacity.current() <= 0.0 {
            self.layout_fade_pending.set(false);
        }
        if let Some(target) = self.fade_target() {
            let faded = drive(&self.opacity, target);
            debug_assert!(faded.is_ok(), "fade targets are finite");
        }
        let fading_out = self.opacity.target() < self.opacity.current();
        if !(self.pause_motion_on_fade.get() && fading_out) {
            self.retarget();
        }

        let transitioning = self.orientation.is_transitioning()
            || self.bounds.is_transitioning()
            || self.opacity.is_transitioning();
        let previous = self.status.get();
        self.previous_status.set(previous);
        self.status.set(match (transitioning, previous) {
            (false, _) => AdapterStatus::Stable,
            (true, AdapterStatus::Stable) => AdapterStatus::TransitionBegin,
            (true, _) => AdapterStatus::Transitioning,
        });
        self.metrics.invalidate_node_states();

        let hook = self.on_post_update.borrow().clone();
        if let Some(hook) = hook {
            hook(sys, self);
        }
    }

    /// The opacity the enabled fade behaviors call for, or `None` when none
    /// is enabled.
    fn fade_target(&self) -> Option<f64> {
        if !self.fades() {
            return None;
        }
        let hidden = self.fade_on_enter_exit.get()
            && (self.parent_node.get() == TargetParent::Remove
                || self.active_layout.borrow().is_none());
        let dipped = self.layout_fade_pending.get()
            || self
                .fade_on_pose_change
                .get()
                .is_some_and(|limit| self.pose_difference() > limit);
        Some(if hidden || dipped { 0.0 } else { 1.0 })
    }

    /// How far the active layout's best pose is from the current pose.
    fn pose_difference(&self) -> f64 {
        let Some(best) = self.active_layout().and_then(|layout| layout.best()) else {
            return 0.0;
        };
        let orientation = best
            .sample
            .orientation
            .filter(|_| self.orientation.is_active())
            .map_or(0.0, |q| self.orientation.current().distance(&q) / PI);
        let bounds = best
            .sample
            .bounds
            .filter(|_| self.bounds.is_active())
            .map_or(0.0, |b| self.bounds.current().distance(&b));
        orientation.max(bounds)
    }

    /// Points the drivers at the active layout's best sample.
    ///
    /// A best sample the drivers reject is discarded along with the rest of
    /// that layout's search state.
    fn retarget(&self) {
        let Some(layout) = self.active_layout() else {
            return;
        };
        let Some(best) = layout.best() else {
            return;
        };
        let orientation = match best.sample.orientation {
            Some(q) if layout.controls_orientation() => drive(&self.orientation, q),
            _ => {
                self.orientation.set_active(false);
                Ok(())
            }
        };
        let bounds = match best.sample.bounds {
            Some(b) if layout.controls_bounds() => drive(&self.bounds, b),
            _ => {
                self.bounds.set_active(false);
                Ok(())
            }
        };
        if orientation.and(bounds).is_err() {
            layout.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutContext;
    use crate::testing::{NodeId, TestScene};
    use crate::terms;
    use nalgebra::{Matrix4, Vector3};

    fn scene() -> (System<TestScene>, NodeId) {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let unit = Box3::new(Vector3::repeat(-0.5), Vector3::repeat(0.5));
        let node = scene.add(
            None,
            Matrix4::new_translation(&Vector3::new(0.0, 0.0, -3.0)),
            unit,
        );
        (System::new(view, scene), node)
    }

    #[test]
    fn layouts_are_numbered_and_presented_once() {
        let (sys, node) = scene();
        let adapter = sys.adapter(node);
        let a = adapter.create_layout("a");
        let b = adapter.create_layout("b");
        assert_eq!((a.id(), b.id()), (0, 1), "creation order");
        assert!(adapter.layouts().is_empty(), "not presentable yet");

        adapter.present(&b);
        adapter.present(&a);
        adapter.present(&b);
        let names: Vec<_> = adapter.layouts().iter().map(|l| l.name().to_owned()).collect();
        assert_eq!(names, ["b", "a"], "presentation order, no duplicates");
        assert_eq!(adapter.all_layouts().len(), 2, "all layouts");
    }

    #[test]
    #[should_panic(expected = "layout belongs to another adapter")]
    fn foreign_layouts_cannot_be_presented() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let a = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let b = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let sys = System::new(view, scene);
        let layout = sys.adapter(a).create_layout("mine");
        sys.adapter(b).present(&layout);
    }

    #[test]
    fn feasible_layout_becomes_active_and_drives_bounds() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        let layout = adapter.create_layout("left");
        layout
            .set_controls_orientation(false)
            .add_objective(1.0, terms::pull_center(Vector3::new(-1.0, 0.0, -3.0)));
        adapter.present(&layout);

        sys.update(0.016, 0.016);
        let active = adapter.active_layout().expect("unconstrained layout is feasible");
        assert!(Rc::ptr_eq(&active, &layout), "the only layout");
        assert!(adapter.bounds().is_active(), "bounds are driven");
        assert!(!adapter.orientation().is_active(), "orientation is left alone");
        let best = layout.best().and_then(|b| b.sample.bounds);
        assert_eq!(Some(adapter.bounds().target()), best, "target follows best");
    }

    #[test]
    fn layout_switch_records_previous() {
        let (sys, node) = scene();
        let adapter = sys.adapter(node);
        let a = adapter.create_layout("a");
        let b = adapter.create_layout("b");
        adapter.set_active_layout(Some(a.clone()));
        adapter.set_active_layout(Some(b.clone()));
        assert!(adapter.active_layout().is_some_and(|l| Rc::ptr_eq(&l, &b)), "active");
        assert!(adapter.previous_layout().is_some_and(|l| Rc::ptr_eq(&l, &a)), "previous");
        assert_eq!(adapter.status(), AdapterStatus::Stable, "status reset");
    }

    #[test]
    fn status_reports_transition_begin_then_transitioning() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        adapter.set_transition(Some(TransitionConfig {
            duration: 1.0,
            ..TransitionConfig::default()
        }));
        adapter.opacity().set_active(true);
        adapter.opacity().set_target(0.0).unwrap();

        sys.update(0.1, 0.1);
        assert_eq!(adapter.status(), AdapterStatus::TransitionBegin, "first frame");
        sys.update(0.1, 0.2);
        assert_eq!(adapter.status(), AdapterStatus::Transitioning, "second frame");
        assert!(adapter.progress() < 1.0, "mid-blend");
        for i in 0..20 {
            sys.update(0.1, 0.3 + f64::from(i) * 0.1);
        }
        assert_eq!(adapter.status(), AdapterStatus::Stable, "settled");
        assert_eq!(adapter.opacity().current(), 0.0, "faded");
    }

    #[test]
    fn fade_hides_nodes_without_layouts_and_removed_nodes() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        adapter.set_fade_on_enter_exit(true);
        sys.update(0.016, 0.016);
        assert_eq!(adapter.opacity().target(), 0.0, "no active layout");

        let layout = adapter.create_layout("any");
        adapter.present(&layout);
        sys.update(0.016, 0.032);
        assert_eq!(adapter.opacity().target(), 1.0, "entered");

        adapter.set_parent_node(TargetParent::Remove);
        sys.update(0.016, 0.048);
        assert_eq!(adapter.opacity().target(), 0.0, "exiting");
    }

    #[test]
    fn hooks_run_around_the_optimizer() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        let log = Rc::new(RefCell::new(Vec::new()));
        let layout = adapter.create_layout("logged");
        let seen = log.clone();
        layout.add_objective(1.0, move |_: &LayoutContext<'_, TestScene>| {
            seen.borrow_mut().push("score");
            0.0
        });
        adapter.present(&layout);
        let pre = log.clone();
        adapter.on_pre_update(move |_, _| pre.borrow_mut().push("pre"));
        let post = log.clone();
        adapter.on_post_update(move |_, a| {
            assert!(a.active_layout().is_some(), "post hook sees the selection");
            post.borrow_mut().push("post");
        });

        sys.update(0.016, 0.016);
        let log = log.borrow();
        assert_eq!(log.first(), Some(&"pre"), "pre hook first");
        assert_eq!(log.last(), Some(&"post"), "post hook last");
        assert!(log.contains(&"score"), "optimizer ran in between");
    }

    #[test]
    fn parent_adapter_skips_plain_ancestors() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let top = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let middle = scene.add(Some(top), Matrix4::identity(), Box3::EMPTY);
        let leaf = scene.add(Some(middle), Matrix4::identity(), Box3::EMPTY);
        let sys = System::new(view, scene);
        let top_adapter = sys.adapter(top);

        let found = sys.adapter(leaf).parent_adapter(&sys);
        assert!(
            found.is_some_and(|a| Rc::ptr_eq(&a, &top_adapter)),
            "nearest adaptive ancestor"
        );
        assert!(top_adapter.parent_adapter(&sys).is_none(), "root has none");
    }

    fn constant_layout(
        adapter: &SpatialAdapter<TestScene>,
        name: &str,
        score: f64,
    ) -> Rc<SpatialLayout<TestScene>> {
        let layout = adapter.create_layout(name);
        layout.add_objective(1.0, move |_: &LayoutContext<'_, TestScene>| score);
        layout
    }

    fn is_active(adapter: &SpatialAdapter<TestScene>, layout: &Rc<SpatialLayout<TestScene>>) -> bool {
        adapter.active_layout().is_some_and(|l| Rc::ptr_eq(&l, layout))
    }

    #[test]
    fn near_tie_keeps_incumbent_through_updates() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        let incumbent = constant_layout(&adapter, "incumbent", 1.0);
        adapter.present(&incumbent);
        sys.update(0.016, 0.016);
        assert!(is_active(&adapter, &incumbent), "only layout");

        // 1e-4 better, inside the 1e-3 relative tolerance.
        let close = constant_layout(&adapter, "close", 1.0 - 1e-4);
        adapter.set_layouts(vec![close.clone(), incumbent.clone()]);
        sys.update(0.016, 0.032);
        assert!(is_active(&adapter, &incumbent), "marginal challenger is ignored");

        let clear = constant_layout(&adapter, "clear", 0.5);
        adapter.set_layouts(vec![clear.clone(), close, incumbent.clone()]);
        sys.update(0.016, 0.048);
        assert!(is_active(&adapter, &clear), "clear improvement switches");
        assert!(
            adapter.previous_layout().is_some_and(|l| Rc::ptr_eq(&l, &incumbent)),
            "previous"
        );
    }

    #[test]
    fn layout_change_fades_out_then_back_in() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        adapter.set_fade_on_layout_change(true);
        assert!(adapter.opacity().is_active(), "fading drives opacity");
        let first = constant_layout(&adapter, "first", 1.0);
        adapter.present(&first);
        sys.update(0.016, 0.016);
        assert_eq!(adapter.opacity().target(), 1.0, "entering is not a change");

        let second = constant_layout(&adapter, "second", 0.0);
        adapter.set_layouts(vec![second.clone(), first]);
        sys.update(0.016, 0.032);
        assert!(is_active(&adapter, &second), "switched");
        assert_eq!(adapter.opacity().target(), 0.0, "fading out");

        sys.update(0.016, 0.048);
        assert_eq!(adapter.opacity().current(), 0.0, "faded out");
        assert_eq!(adapter.opacity().target(), 1.0, "fading back in");

        adapter.set_fade_on_layout_change(false);
        assert!(!adapter.opacity().is_active(), "nothing left to fade");
    }

    #[test]
    fn fade_on_pose_change_dips_while_pose_is_far() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        adapter.set_fade_on_pose_change(Some(0.5));
        let layout = adapter.create_layout("still");
        layout
            .set_controls_orientation(false)
            .add_objective(1.0, |_: &LayoutContext<'_, TestScene>| 0.0);
        adapter.present(&layout);
        sys.update(0.016, 0.016);
        assert_eq!(adapter.opacity().target(), 1.0, "first placement");
        let placed = adapter.bounds().target();

        let shift = Vector3::new(5.0, 0.0, 0.0);
        let away = Box3::new(placed.min + shift, placed.max + shift);
        adapter.bounds().reset(away).unwrap();
        sys.update(0.016, 0.032);
        assert_eq!(adapter.opacity().target(), 0.0, "far from the best pose");
        assert_eq!(adapter.bounds().target(), placed, "heading back");

        sys.update(0.016, 0.048);
        assert!(adapter.bounds().current().distance(&placed) < 1e-12, "arrived");
        assert_eq!(adapter.opacity().target(), 1.0, "visible again");
    }

    #[test]
    fn motion_waits_for_fade_out() {
        let (mut sys, node) = scene();
        let adapter = sys.adapter(node);
        adapter.set_fade_on_layout_change(true);
        adapter.set_pause_motion_on_fade(true);
        let left = adapter.create_layout("left");
        left.set_controls_orientation(false)
            .add_objective(1.0, terms::pull_center(Vector3::new(-1.0, 0.0, -3.0)))
            .add_objective(1.0, |_: &LayoutContext<'_, TestScene>| 10.0);
        adapter.present(&left);
        sys.update(0.016, 0.016);
        let held = adapter.bounds().target();

        let right = adapter.create_layout("right");
        right
            .set_controls_orientation(false)
            .add_objective(1.0, terms::pull_center(Vector3::new(1.0, 0.0, -3.0)));
        adapter.set_layouts(vec![right.clone(), left]);
        sys.update(0.016, 0.032);
        assert!(is_active(&adapter, &right), "switched");
        assert_eq!(adapter.bounds().target(), held, "held while fading out");

        sys.update(0.016, 0.048);
        let best = right.best().and_then(|b| b.sample.bounds);
        assert_eq!(Some(adapter.bounds().target()), best, "moves once faded");
        assert_ne!(best, Some(held), "new pose");
    }

    #[test]
    fn sync_updates_parent_adapter_first() {
        let mut scene = TestScene::new();
        let view = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let node = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let anchor = scene.add(None, Matrix4::identity(), Box3::EMPTY);
        let mut sys = System::new(view, scene);
        let child = sys.adapter(node);
        let parent = sys.adapter(anchor);
        child.set_parent_node(TargetParent::Node(anchor));

        let log = Rc::new(RefCell::new(Vec::new()));
        let seen = log.clone();
        child.on_pre_update(move |_, _| seen.borrow_mut().push("child"));
        let seen = log.clone();
        parent.on_pre_update(move |_, _| seen.borrow_mut().push("parent"));

        sys.update(0.016, 0.016);
        assert_eq!(*log.borrow(), ["child", "parent"], "creation order");

        log.borrow_mut().clear();
        child.set_sync_with_parent_adapter(true);
        sys.update(0.016, 0.032);
        assert_eq!(*log.borrow(), ["parent", "child"], "parent first");
    }
}
