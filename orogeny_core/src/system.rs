// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-session orchestrator.
//!
//! A [`System`] owns the node-to-metrics and node-to-adapter maps, the
//! global configuration, the view frustum, the optimizer, and the registry
//! of transitionables. The host calls [`System::update`] once per frame.
//!
//! # Update order
//!
//! 1. **Invalidate**: every metrics record and every adapter-owned
//!    transitionable is marked dirty.
//! 2. **Transition**: dropped transitionables are pruned, then every live
//!    one is marked dirty again and stepped in registration order.
//! 3. **Resolve view**: the view node's metrics (and its ancestors') are
//!    brought up to date, refreshing the view frustum.
//! 4. **Optimize**: every adapter's metrics are updated, which runs the
//!    optimizer and retargets the adapter's transitionables.
//!
//! Targets chosen in step 4 start blending in step 2 of the next update.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use indexmap::IndexMap;
use nalgebra::Matrix4;

use crate::adapter::{AdapterStatus, SpatialAdapter};
use crate::bindings::{NodeBindings, StateSnapshot};
use crate::cache::next_revision;
use crate::frustum::ViewFrustum;
use crate::metrics::SpatialMetrics;
use crate::optimizer::{OptimizerConfig, SpatialOptimizer};
use crate::state::StateMode;
use crate::trace::{
    FrameBeginEvent, FrameSummaryBuilder, LayoutActivatedEvent, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, StatusChangeEvent, SwarmRestartEvent, Tracer,
};
use crate::transition::{AnyTransitionable, TransitionConfig, TransitionValue, Transitionable};

/// Global configuration.
#[derive(Clone, Copy, Debug)]
pub struct SystemConfig {
    /// Lengths below this are treated as zero.
    pub epsilon_meters: f64,
    /// Angles below this are treated as zero.
    pub epsilon_radians: f64,
    /// Ratios closer than this to one are treated as one.
    pub epsilon_ratio: f64,
    /// Upper clamp for the delta time passed to [`System::update`], in
    /// seconds.
    pub max_delta_time: f64,
    /// Defaults for transitionables without their own configuration.
    pub transition: TransitionConfig,
    /// Defaults for adapters without their own optimizer configuration.
    pub optimize: OptimizerConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            epsilon_meters: 1e-10,
            epsilon_radians: 1e-10,
            epsilon_ratio: 1e-10,
            max_delta_time: 0.1,
            transition: TransitionConfig::default(),
            optimize: OptimizerConfig::default(),
        }
    }
}

/// Adapter state captured before the optimize phase, for trace events.
struct AdapterMark {
    active: Option<u32>,
    status: AdapterStatus,
    restarts: Vec<(u32, u64)>,
}

impl AdapterMark {
    fn capture<B: NodeBindings>(adapter: &SpatialAdapter<B>) -> Self {
        Self {
            active: adapter.active_layout().map(|l| l.id()),
            status: adapter.status(),
            restarts: adapter
                .layouts()
                .iter()
                .map(|l| (l.id(), l.restarts()))
                .collect(),
        }
    }
}

fn count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// One adaptive layout session over a host scene graph.
pub struct System<B: NodeBindings> {
    bindings: B,
    view_node: B::Node,
    config: SystemConfig,
    view_frustum: Cell<ViewFrustum>,
    frustum_revision: Cell<u64>,
    delta_time: f64,
    time: f64,
    frame_index: u64,
    metrics: RefCell<IndexMap<B::Node, Rc<SpatialMetrics<B>>>>,
    adapters: RefCell<IndexMap<B::Node, Rc<SpatialAdapter<B>>>>,
    transitionables: RefCell<Vec<Weak<dyn AnyTransitionable>>>,
    optimizer: SpatialOptimizer,
    next_index: Cell<u32>,
    epoch: Instant,
}

impl<B: NodeBindings + fmt::Debug> fmt::Debug for System<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("bindings", &self.bindings)
            .field("view_node", &self.view_node)
            .field("view_frustum", &self.view_frustum.get())
            .field("frame_index", &self.frame_index)
            .field("metrics", &self.metrics.borrow().len())
            .field("adapters", &self.adapters.borrow().len())
            .field("transitionables", &self.transitionables.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<B: NodeBindings> System<B> {
    /// Creates a system with the default configuration.
    #[must_use]
    pub fn new(view_node: B::Node, bindings: B) -> Self {
        Self::with_config(view_node, bindings, SystemConfig::default())
    }

    /// Creates a system with the given configuration.
    #[must_use]
    pub fn with_config(view_node: B::Node, bindings: B, config: SystemConfig) -> Self {
        Self {
            bindings,
            view_node,
            config,
            view_frustum: Cell::new(ViewFrustum::default()),
            frustum_revision: Cell::new(next_revision()),
            delta_time: 0.0,
            time: 0.0,
            frame_index: 0,
            metrics: RefCell::new(IndexMap::new()),
            adapters: RefCell::new(IndexMap::new()),
            transitionables: RefCell::new(Vec::new()),
            optimizer: SpatialOptimizer::new(config.optimize.seed),
            next_index: Cell::new(0),
            epoch: Instant::now(),
        }
    }

    // -- accessors ----------------------------------------------------------

    /// The camera-equivalent node everything is laid out against.
    #[inline]
    #[must_use]
    pub fn view_node(&self) -> B::Node {
        self.view_node
    }

    /// Global configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Mutable global configuration. Takes effect on the next update.
    #[inline]
    pub fn config_mut(&mut self) -> &mut SystemConfig {
        &mut self.config
    }

    /// The host scene-graph bindings.
    #[inline]
    #[must_use]
    pub fn bindings(&self) -> &B {
        &self.bindings
    }

    /// Mutable access to the bindings, for host-side scene edits.
    #[inline]
    pub fn bindings_mut(&mut self) -> &mut B {
        &mut self.bindings
    }

    /// The view frustum, as last refreshed from the view node's projection.
    #[inline]
    #[must_use]
    pub fn view_frustum(&self) -> ViewFrustum {
        self.view_frustum.get()
    }

    /// Replaces the view frustum.
    pub fn set_view_frustum(&self, frustum: ViewFrustum) {
        self.view_frustum.set(frustum);
        self.frustum_revision.set(next_revision());
    }

    /// Revision at which the view frustum last changed.
    #[inline]
    #[must_use]
    pub fn frustum_revision(&self) -> u64 {
        self.frustum_revision.get()
    }

    /// Clamped delta time of the last update, in seconds.
    #[inline]
    #[must_use]
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Host time of the last update, in seconds.
    #[inline]
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed updates.
    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// The shared layout optimizer.
    #[inline]
    #[must_use]
    pub fn optimizer(&self) -> &SpatialOptimizer {
        &self.optimizer
    }

    pub(crate) fn refresh_view_frustum(&self, projection: &Matrix4<f64>) {
        let frustum = ViewFrustum::from_perspective_projection(projection, None);
        let current = self.view_frustum.get();
        if !frustum.approx_eq(
            &current,
            self.config.epsilon_radians.to_degrees(),
            self.config.epsilon_meters,
        ) {
            self.set_view_frustum(frustum);
        }
    }

    // -- records ------------------------------------------------------------

    /// The metrics record for `node`, created on first use.
    pub fn metrics(&self, node: B::Node) -> Rc<SpatialMetrics<B>> {
        if let Some(metrics) = self.metrics.borrow().get(&node) {
            return metrics.clone();
        }
        let index = self.next_index.get();
        self.next_index.set(index.wrapping_add(1));
        let metrics = Rc::new(SpatialMetrics::new(node, index));
        self.metrics.borrow_mut().insert(node, metrics.clone());
        metrics
    }

    /// The view node's metrics.
    #[must_use]
    pub fn view_metrics(&self) -> Rc<SpatialMetrics<B>> {
        self.metrics(self.view_node)
    }

    /// The adapter for `node`, created on first use.
    ///
    /// Creating an adapter removes the node from its ancestors' inner bounds.
    pub fn adapter(&self, node: B::Node) -> Rc<SpatialAdapter<B>> {
        if let Some(adapter) = self.existing_adapter(node) {
            return adapter;
        }
        let adapter = Rc::new(SpatialAdapter::new(self, node));
        self.adapters.borrow_mut().insert(node, adapter.clone());

        let metrics = adapter.metrics();
        let mut ancestor = metrics.raw(self).parent;
        while let Some(parent) = ancestor {
            let parent_metrics = self.metrics(parent);
            parent_metrics.invalidate_children();
            parent_metrics.invalidate_node_states();
            ancestor = parent_metrics.raw(self).parent;
        }
        metrics.invalidate_node_states();
        adapter
    }

    /// The adapter for `node`, if one has been created.
    #[must_use]
    pub fn existing_adapter(&self, node: B::Node) -> Option<Rc<SpatialAdapter<B>>> {
        self.adapters.borrow().get(&node).cloned()
    }

    /// Metrics of every node with an adapter, in creation order.
    #[must_use]
    pub fn adaptive_metrics(&self) -> Vec<Rc<SpatialMetrics<B>>> {
        self.adapters
            .borrow()
            .keys()
            .map(|&node| self.metrics(node))
            .collect()
    }

    /// Drops the metrics and adapter records of `node`.
    ///
    /// The host calls this after removing a node from its scene graph.
    /// Returns `true` if anything was removed. Transitionables owned by the
    /// adapter are unregistered once the last handle to them is dropped.
    ///
    /// The host is not queried about `node`: its parent is taken from the
    /// last snapshot the metrics read.
    pub fn forget(&self, node: B::Node) -> bool {
        let parent = self
            .metrics
            .borrow()
            .get(&node)
            .and_then(|metrics| metrics.cached_parent());
        let adapter = self.adapters.borrow_mut().shift_remove(&node);
        let metrics = self.metrics.borrow_mut().shift_remove(&node);
        let parent = parent.and_then(|parent| self.metrics.borrow().get(&parent).cloned());
        if let Some(parent) = parent {
            parent.invalidate_children();
        }
        adapter.is_some() || metrics.is_some()
    }

    /// Target state of `node`: where it is heading.
    #[must_use]
    pub fn state(&self, node: B::Node) -> StateSnapshot<B::Node> {
        self.metrics(node).target_state(self).snapshot(self)
    }

    /// Current state of `node`: the blended pose for this frame.
    #[must_use]
    pub fn current_state(&self, node: B::Node) -> StateSnapshot<B::Node> {
        self.metrics(node).current_state(self).snapshot(self)
    }

    /// Writes the current state of `node` back through the bindings.
    pub fn apply(&mut self, node: B::Node) {
        self.apply_state(node, StateMode::Current);
    }

    /// Writes the `mode` state of `node` back through the bindings.
    pub fn apply_state(&mut self, node: B::Node, mode: StateMode) {
        let metrics = self.metrics(node);
        let snapshot = metrics.state(self, mode).snapshot(self);
        self.bindings.apply(node, &snapshot);
        metrics.invalidate_node_states();
    }

    // -- transitionables ----------------------------------------------------

    /// Creates a transitionable that is stepped on every update with the
    /// system's default transition configuration.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not valid.
    pub fn create_transitionable<T: TransitionValue>(&self, value: T) -> Rc<Transitionable<T>> {
        self.register(Rc::new(Transitionable::new(value)))
    }

    /// Like [`create_transitionable`](Self::create_transitionable), with its
    /// own configuration.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not valid.
    pub fn create_transitionable_with<T: TransitionValue>(
        &self,
        value: T,
        config: TransitionConfig,
    ) -> Rc<Transitionable<T>> {
        self.register(Rc::new(Transitionable::with_config(value, config)))
    }

    fn register<T: TransitionValue>(&self, t: Rc<Transitionable<T>>) -> Rc<Transitionable<T>> {
        let erased: Rc<dyn AnyTransitionable> = t.clone();
        self.transitionables
            .borrow_mut()
            .push(Rc::downgrade(&erased));
        t
    }

    /// Number of registered transitionables that are still alive.
    #[must_use]
    pub fn transitionable_count(&self) -> usize {
        self.transitionables
            .borrow()
            .iter()
            .filter(|t| t.strong_count() > 0)
            .count()
    }

    // -- update -------------------------------------------------------------

    /// Runs one frame.
    ///
    /// `delta_time` is clamped to `[0, max_delta_time]`; non-finite values
    /// count as zero.
    pub fn update(&mut self, delta_time: f64, time: f64) {
        self.update_traced(delta_time, time, &mut Tracer::none());
    }

    /// Like [`update`](Self::update), reporting events to `tracer`.
    pub fn update_traced(&mut self, delta_time: f64, time: f64, tracer: &mut Tracer<'_>) {
        self.delta_time = if delta_time.is_finite() {
            delta_time.clamp(0.0, self.config.max_delta_time)
        } else {
            0.0
        };
        self.time = time;

        let begin = FrameBeginEvent {
            frame_index: self.frame_index,
            time,
            delta_time: self.delta_time,
            timestamp: self.now(),
        };
        tracer.frame_begin(&begin);
        let mut summary = FrameSummaryBuilder::new(&begin);

        self.begin_phase(tracer, &mut summary, PhaseKind::Invalidate);
        let all_metrics: Vec<_> = self.metrics.borrow().values().cloned().collect();
        for metrics in &all_metrics {
            metrics.mark_needs_update();
        }
        let adapters: Vec<_> = self.adapters.borrow().values().cloned().collect();
        for adapter in &adapters {
            adapter.orientation().mark_needs_update();
            adapter.bounds().mark_needs_update();
            adapter.opacity().mark_needs_update();
        }
        self.end_phase(tracer, &mut summary, PhaseKind::Invalidate);

        self.begin_phase(tracer, &mut summary, PhaseKind::Transition);
        let live = self.step_transitionables();
        summary.set_transitionables(count(live));
        self.end_phase(tracer, &mut summary, PhaseKind::Transition);

        self.begin_phase(tracer, &mut summary, PhaseKind::ResolveView);
        self.view_metrics().update(self);
        self.end_phase(tracer, &mut summary, PhaseKind::ResolveView);

        self.begin_phase(tracer, &mut summary, PhaseKind::Optimize);
        let adapters: Vec<_> = self.adapters.borrow().values().cloned().collect();
        let marks: Vec<_> = if tracer.is_enabled() {
            adapters.iter().map(|a| AdapterMark::capture(a)).collect()
        } else {
            Vec::new()
        };
        for adapter in &adapters {
            adapter.metrics().update(self);
        }
        for (adapter, mark) in adapters.iter().zip(&marks) {
            self.trace_adapter(tracer, adapter, mark);
        }
        #[cfg(feature = "trace-rich")]
        if tracer.is_enabled() {
            let scores = self.layout_scores(&adapters);
            tracer.layout_scores(self.frame_index, &scores);
        }
        self.end_phase(tracer, &mut summary, PhaseKind::Optimize);

        let active = adapters
            .iter()
            .filter(|a| a.active_layout().is_some())
            .count();
        let transitioning = adapters
            .iter()
            .filter(|a| a.status() != AdapterStatus::Stable)
            .count();
        summary.set_adapters(count(adapters.len()), count(active), count(transitioning));
        tracer.frame_summary(&summary.finish());

        self.frame_index += 1;
    }

    /// Prunes dropped transitionables, then arms and steps the rest in
    /// registration order. Returns how many are alive.
    fn step_transitionables(&self) -> usize {
        let live: Vec<Rc<dyn AnyTransitionable>> = {
            let mut registry = self.transitionables.borrow_mut();
            registry.retain(|t| t.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        for t in &live {
            t.arm();
        }
        for t in &live {
            t.step(self.delta_time, &self.config.transition);
        }
        live.len()
    }

    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn begin_phase(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        phase: PhaseKind,
    ) {
        if !tracer.is_enabled() {
            return;
        }
        let timestamp = self.now();
        summary.phase_begin(phase, timestamp);
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: self.frame_index,
            phase,
            timestamp,
        });
    }

    fn end_phase(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        phase: PhaseKind,
    ) {
        if !tracer.is_enabled() {
            return;
        }
        let timestamp = self.now();
        summary.phase_end(phase, timestamp);
        tracer.phase_end(&PhaseEndEvent {
            frame_index: self.frame_index,
            phase,
            timestamp,
        });
    }

    fn trace_adapter(
        &self,
        tracer: &mut Tracer<'_>,
        adapter: &SpatialAdapter<B>,
        mark: &AdapterMark,
    ) {
        let node_index = adapter.metrics().index();
        let active = adapter.active_layout();
        let active_id = active.as_ref().map(|l| l.id());
        if active_id != mark.active {
            tracer.layout_activated(&LayoutActivatedEvent {
                frame_index: self.frame_index,
                node_index,
                layout: active_id,
                previous: mark.active,
                score: active.as_ref().and_then(|l| l.best()).map(|b| b.score),
            });
        }
        if adapter.status() != mark.status {
            tracer.status_change(&StatusChangeEvent {
                frame_index: self.frame_index,
                node_index,
                status: adapter.status(),
                previous: mark.status,
            });
        }
        for layout in adapter.layouts() {
            let before = mark
                .restarts
                .iter()
                .find(|(id, _)| *id == layout.id())
                .map_or(0, |&(_, restarts)| restarts);
            if layout.restarts() > before {
                tracer.swarm_restart(&SwarmRestartEvent {
                    frame_index: self.frame_index,
                    node_index,
                    layout: layout.id(),
                    restarts: layout.restarts(),
                    success_rate: layout.success_rate(),
                });
            }
        }
    }

    #[cfg(feature = "trace-rich")]
    fn layout_scores(
        &self,
        adapters: &[Rc<SpatialAdapter<B>>],
    ) -> Vec<crate::trace::LayoutScore> {
        let mut scores = Vec::new();
        for adapter in adapters {
            let node_index = adapter.metrics().index();
            for layout in adapter.layouts() {
                scores.push(crate::trace::LayoutScore {
                    node_index,
                    layout: layout.id(),
                    score: layout
                        .best()
                        .filter(crate::layout::Scored::is_feasible)
                        .map(|b| b.score),
                    step_size: layout.step_size(),
                    success_rate: layout.success_rate(),
                });
            }
        }
        scores
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
