// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node spatial metrics.
//!
//! [`SpatialMetrics`] is the engine's view of one host node. It reads the
//! node through [`NodeBindings`], aggregates bounds over non-adaptive
//! descendants, and owns the node's current and target [`NodeState`]s.
//!
//! Resolving a state runs the layout application step: when the node's
//! adapter has an active bounds value, the node is scaled and placed so that
//! its inner bounds fill that box in layout space; otherwise the host's own
//! local transform is used, optionally with an adapter-driven orientation.

use core::cell::Cell;
use core::fmt;
use std::rc::Rc;

use nalgebra::Matrix4;

use crate::adapter::TargetParent;
use crate::bindings::{NodeBindings, NodeSnapshot};
use crate::bounds::{Box3, inflate_size};
use crate::cache::{Cache, Memo, next_revision};
use crate::state::{NodeState, StateMode};
use crate::system::System;
use crate::transform;

const fn slot(mode: StateMode) -> usize {
    match mode {
        StateMode::Current => 0,
        StateMode::Target => 1,
    }
}

/// Spatial metrics for one host node.
pub struct SpatialMetrics<B: NodeBindings> {
    node: B::Node,
    index: u32,
    cache: Cache,
    needs_update: Cell<bool>,
    raw: Memo<NodeSnapshot<B::Node>>,
    intrinsic: Memo<Box3>,
    node_children: Memo<Rc<[B::Node]>>,
    bounds_children: Memo<Rc<[B::Node]>>,
    inner: Memo<Box3>,
    inner_revision: Cell<u64>,
    states: [NodeState<B>; 2],
    applied: [Memo<()>; 2],
}

impl<B: NodeBindings> fmt::Debug for SpatialMetrics<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialMetrics")
            .field("node", &self.node)
            .field("index", &self.index)
            .field("needs_update", &self.needs_update.get())
            .field("current", &self.states[0])
            .field("target", &self.states[1])
            .finish_non_exhaustive()
    }
}

impl<B: NodeBindings> SpatialMetrics<B> {
    pub(crate) fn new(node: B::Node, index: u32) -> Self {
        Self {
            node,
            index,
            cache: Cache::new(),
            needs_update: Cell::new(true),
            raw: Memo::new(),
            intrinsic: Memo::new(),
            node_children: Memo::new(),
            bounds_children: Memo::new(),
            inner: Memo::new(),
            inner_revision: Cell::new(0),
            states: [
                NodeState::new(StateMode::Current, node),
                NodeState::new(StateMode::Target, node),
            ],
            applied: [Memo::new(), Memo::new()],
        }
    }

    /// The host node.
    #[inline]
    #[must_use]
    pub fn node(&self) -> B::Node {
        self.node
    }

    /// Registration order within the system. Used to label diagnostics.
    #[inline]
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The host parent as last read from the bindings. Never queries them.
    pub(crate) fn cached_parent(&self) -> Option<B::Node> {
        self.raw.peek().and_then(|raw| raw.parent)
    }

    pub(crate) fn mark_needs_update(&self) {
        self.needs_update.set(true);
    }

    /// Brings the metrics up to date for this frame. Idempotent until the
    /// system's next update.
    ///
    /// The parent's metrics are updated first. Nodes with an adapter then run
    /// the adapter's update (optimizer and transition targets); other nodes
    /// only drop their cached bounds and states.
    pub fn update(&self, sys: &System<B>) {
        if !self.needs_update.replace(false) {
            return;
        }
        self.raw.invalidate();
        if let Some(parent) = self.raw(sys).parent {
            sys.metrics(parent).update(sys);
        }
        match sys.existing_adapter(self.node) {
            Some(adapter) => adapter.update(sys),
            None => {
                self.invalidate_inner_bounds(sys);
                self.invalidate_node_states();
            }
        }
    }

    /// What the host reports for this node.
    ///
    /// Reading the view node also refreshes the system view frustum from its
    /// projection, if it has one.
    #[must_use]
    pub fn raw(&self, sys: &System<B>) -> NodeSnapshot<B::Node> {
        self.raw.get(&self.cache, || {
            let snapshot = sys.bindings().state(self.node);
            if self.node == sys.view_node() {
                if let Some(projection) = &snapshot.projection {
                    sys.refresh_view_frustum(projection);
                }
            }
            snapshot
        })
    }

    // -- bounds -------------------------------------------------------------

    /// Bounds of geometry attached directly to this node, in local space.
    #[must_use]
    pub fn intrinsic_bounds(&self, sys: &System<B>) -> Box3 {
        self.intrinsic
            .get(&self.cache, || sys.bindings().intrinsic_bounds(self.node))
    }

    /// Center of [`intrinsic_bounds`](Self::intrinsic_bounds).
    #[must_use]
    pub fn intrinsic_center(&self, sys: &System<B>) -> nalgebra::Vector3<f64> {
        self.intrinsic_bounds(sys).center()
    }

    /// Size of [`intrinsic_bounds`](Self::intrinsic_bounds).
    #[must_use]
    pub fn intrinsic_size(&self, sys: &System<B>) -> nalgebra::Vector3<f64> {
        self.intrinsic_bounds(sys).size()
    }

    /// Intrinsic bounds unioned with every non-adaptive child's inner bounds,
    /// in local space.
    ///
    /// Each child contributes through its host-reported local matrix. Axes
    /// no wider than the system's `epsilon_meters` are widened to ten times
    /// that, around the same center. The view node has no inner bounds.
    #[must_use]
    pub fn inner_bounds(&self, sys: &System<B>) -> Box3 {
        self.inner.get(&self.cache, || {
            self.inner_revision.set(next_revision());
            if self.node == sys.view_node() {
                return Box3::EMPTY;
            }
            let mut inner = self.intrinsic_bounds(sys);
            for &child in self.bounds_children(sys).iter() {
                let metrics = sys.metrics(child);
                let local = metrics.raw(sys).local_matrix;
                inner = inner.union(&metrics.inner_bounds(sys).transformed(&local));
            }
            inner.inflated(sys.config().epsilon_meters)
        })
    }

    /// Center of [`inner_bounds`](Self::inner_bounds).
    #[must_use]
    pub fn inner_center(&self, sys: &System<B>) -> nalgebra::Vector3<f64> {
        self.inner_bounds(sys).center()
    }

    /// Size of [`inner_bounds`](Self::inner_bounds).
    #[must_use]
    pub fn inner_size(&self, sys: &System<B>) -> nalgebra::Vector3<f64> {
        self.inner_bounds(sys).size()
    }

    /// Revision of the inner bounds, after bringing them up to date.
    pub(crate) fn inner_token(&self, sys: &System<B>) -> u64 {
        let _ = self.inner_bounds(sys);
        self.inner_revision.get()
    }

    /// Returns `true` if the inner bounds will be recomputed on next read.
    #[must_use]
    pub fn inner_bounds_needs_update(&self) -> bool {
        self.inner.needs_update()
    }

    /// Re-reads intrinsic bounds here and in every bounds child.
    pub fn invalidate_intrinsic_bounds(&self, sys: &System<B>) {
        self.intrinsic.invalidate();
        self.inner.invalidate();
        for &child in self.bounds_children(sys).iter() {
            sys.metrics(child).invalidate_intrinsic_bounds(sys);
        }
    }

    /// Drops cached inner bounds and child lists here and, transitively, in
    /// every bounds child.
    pub fn invalidate_inner_bounds(&self, sys: &System<B>) {
        if self.inner.needs_update() {
            return;
        }
        self.node_children.invalidate();
        self.bounds_children.invalidate();
        self.inner.invalidate();
        for &child in self.bounds_children(sys).iter() {
            sys.metrics(child).invalidate_inner_bounds(sys);
        }
    }

    /// Drops the cached child lists and inner bounds of this node only.
    pub(crate) fn invalidate_children(&self) {
        self.node_children.invalidate();
        self.bounds_children.invalidate();
        self.inner.invalidate();
    }

    // -- hierarchy ----------------------------------------------------------

    /// The host's children of this node.
    #[must_use]
    pub fn node_children(&self, sys: &System<B>) -> Rc<[B::Node]> {
        self.node_children.get(&self.cache, || {
            let mut out = Vec::new();
            sys.bindings().children(self.node, &mut out);
            Rc::from(out)
        })
    }

    /// Children that contribute to this node's inner bounds: every child
    /// without an adapter.
    #[must_use]
    pub fn bounds_children(&self, sys: &System<B>) -> Rc<[B::Node]> {
        self.bounds_children.get(&self.cache, || {
            self.node_children(sys)
                .iter()
                .copied()
                .filter(|&child| sys.existing_adapter(child).is_none())
                .collect()
        })
    }

    /// Returns `true` if this node has an adapter.
    #[must_use]
    pub fn is_adaptive(&self, sys: &System<B>) -> bool {
        sys.existing_adapter(self.node).is_some()
    }

    /// The effective parent: the adapter's target parent when it overrides
    /// one, otherwise the host parent.
    #[must_use]
    pub fn parent_node(&self, sys: &System<B>) -> Option<B::Node> {
        self.update(sys);
        match sys.existing_adapter(self.node).map(|a| a.parent_node()) {
            Some(TargetParent::Remove) => None,
            Some(TargetParent::Node(node)) => Some(node),
            Some(TargetParent::Inherit) | None => self.raw(sys).parent,
        }
    }

    /// Metrics of [`parent_node`](Self::parent_node).
    #[must_use]
    pub fn parent_metrics(&self, sys: &System<B>) -> Option<Rc<Self>> {
        self.parent_node(sys).map(|parent| sys.metrics(parent))
    }

    /// The nearest ancestor with non-empty inner bounds.
    #[must_use]
    pub fn outer_metrics(&self, sys: &System<B>) -> Option<Rc<Self>> {
        let mut ancestor = self.parent_metrics(sys);
        while let Some(metrics) = ancestor {
            if !metrics.inner_bounds(sys).is_empty() {
                return Some(metrics);
            }
            ancestor = metrics.parent_metrics(sys);
        }
        None
    }

    /// If `node` is a descendant of this node, returns the child of this
    /// node on the path to it.
    #[must_use]
    pub fn contains_node(&self, sys: &System<B>, node: B::Node) -> Option<B::Node> {
        self.update(sys);
        let mut current = Some(sys.metrics(node));
        while let Some(metrics) = current {
            let parent = metrics.parent_metrics(sys);
            if parent.as_ref().is_some_and(|p| p.node == self.node) {
                return Some(metrics.node);
            }
            current = parent;
        }
        None
    }

    /// Returns `node` if it is an ancestor of this node.
    #[must_use]
    pub fn contained_by_node(&self, sys: &System<B>, node: B::Node) -> Option<B::Node> {
        self.update(sys);
        let mut ancestor = self.parent_metrics(sys);
        while let Some(metrics) = ancestor {
            if metrics.node == node {
                return Some(node);
            }
            ancestor = metrics.parent_metrics(sys);
        }
        None
    }

    // -- states -------------------------------------------------------------

    /// The resolved state for `mode`.
    pub fn state(&self, sys: &System<B>, mode: StateMode) -> &NodeState<B> {
        self.update(sys);
        let token = self.layout_token(sys, mode);
        self.applied[slot(mode)].get_coupled(&self.cache, token, || self.apply_layout(sys, mode));
        &self.states[slot(mode)]
    }

    /// The resolved current state.
    pub fn current_state(&self, sys: &System<B>) -> &NodeState<B> {
        self.state(sys, StateMode::Current)
    }

    /// The resolved target state.
    pub fn target_state(&self, sys: &System<B>) -> &NodeState<B> {
        self.state(sys, StateMode::Target)
    }

    /// Forces both states to be re-resolved and every derived value to be
    /// recomputed.
    pub fn invalidate_node_states(&self) {
        self.raw.invalidate();
        for (applied, state) in self.applied.iter().zip(&self.states) {
            applied.invalidate();
            state.invalidate();
        }
    }

    pub(crate) fn invalidate_target_state(&self) {
        self.applied[slot(StateMode::Target)].invalidate();
        self.states[slot(StateMode::Target)].invalidate();
    }

    fn layout_token(&self, sys: &System<B>, mode: StateMode) -> u64 {
        let mut token = self.inner_token(sys);
        if let Some(parent) = self.parent_metrics(sys) {
            token = token.max(parent.state(sys, mode).world_token(sys));
        }
        if let Some(outer) = self.outer_metrics(sys) {
            token = token.max(outer.inner_token(sys));
        }
        token
    }

    /// Computes and stores the local matrix of the `mode` state.
    fn apply_layout(&self, sys: &System<B>, mode: StateMode) {
        let state = &self.states[slot(mode)];
        let raw = self.raw(sys);
        let parent = self.parent_node(sys);
        state.set_parent(parent);

        let adapter = sys.existing_adapter(self.node);
        let adapter = adapter.as_deref();
        let candidate = match mode {
            StateMode::Current => None,
            StateMode::Target => adapter.and_then(|a| a.candidate()),
        };
        let orientation = candidate.and_then(|c| c.orientation).or_else(|| {
            let a = adapter.filter(|a| a.orientation().is_active())?;
            Some(match mode {
                StateMode::Current => a.orientation().current(),
                StateMode::Target => a.orientation().target(),
            })
        });
        let layout_bounds = candidate
            .and_then(|c| c.bounds)
            .or_else(|| {
                let a = adapter.filter(|a| a.bounds().is_active())?;
                Some(match mode {
                    StateMode::Current => a.bounds().current(),
                    StateMode::Target => a.bounds().target(),
                })
            })
            .filter(|b| !b.is_empty());

        let local: Matrix4<f64> = if let Some(layout_bounds) = layout_bounds {
            let epsilon = sys.config().epsilon_meters;
            let layout_size = inflate_size(layout_bounds.size(), epsilon);
            let inner = self.inner_bounds(sys);
            let inner_size = inner.size();
            let mut scale = layout_size;
            for axis in 0..3 {
                if inner_size[axis].abs() >= epsilon {
                    scale[axis] /= inner_size[axis];
                }
            }

            let orientation =
                orientation.unwrap_or_else(|| transform::decompose(&raw.local_matrix).orientation);
            let parent_world = parent.map(|p| {
                let metrics = sys.metrics(p);
                metrics.state(sys, mode).world(sys)
            });
            let world_orientation =
                parent_world.map_or(orientation, |w| w.parts.orientation * orientation);
            let position = state.world_origin(sys) + world_orientation * layout_bounds.center()
                - world_orientation * inner.center().component_mul(&scale);
            let world = transform::compose(&position, &world_orientation, &scale);
            parent_world.map_or(world, |w| w.inverse * world)
        } else if let Some(orientation) = orientation {
            let parts = transform::decompose(&raw.local_matrix);
            transform::compose(&parts.position, &orientation, &parts.scale)
        } else {
            raw.local_matrix
        };
        state.set_local_matrix(local);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
