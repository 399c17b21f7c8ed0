// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-node, per-mode transform state.
//!
//! Every [`SpatialMetrics`](crate::metrics::SpatialMetrics) owns two
//! [`NodeState`]s: one describing where the node *is*
//! ([`StateMode::Current`]) and one describing where layout wants it to be
//! ([`StateMode::Target`]). A state's only authoritative inputs are
//! its local matrix and its parent; everything else is derived lazily and
//! memoized:
//!
//! ```text
//!   local matrix ──► world frame ──► world center
//!                        │
//!   outer world center ──┴──► layout frame ──► layout bounds, outer bounds
//!                        │
//!   view world frame ────┴──► screen bounds ──► visual frustum ──► occlusion
//! ```
//!
//! Setting the local matrix or parent invalidates the state's own cache.
//! Descendants notice lazily: each world frame records the revision of its
//! parent's world frame and recomputes when it moves. View-relative values
//! are coupled the same way to the view node's world frame and to the
//! system view frustum.
//!
//! State accessors take the [`System`] because derived values reach across
//! nodes (parent, outer, view). Obtain states through
//! [`SpatialMetrics::state`](crate::metrics::SpatialMetrics::state), which
//! resolves the local matrix first.

use core::cell::Cell;
use core::fmt;

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::bindings::{NodeBindings, StateSnapshot};
use crate::bounds::Box3;
use crate::cache::{Cache, Memo, next_revision};
use crate::frustum::ViewFrustum;
use crate::system::System;
use crate::transform::{self, Decomposed};

/// Which of a node's two states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateMode {
    /// What is on screen now, driven by transitionable `current` values.
    Current,
    /// What layout is converging toward, driven by `target` values.
    Target,
}

/// A world transform and its derived parts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldFrame {
    /// Local-to-world transform.
    pub matrix: Matrix4<f64>,
    /// World-to-local transform.
    pub inverse: Matrix4<f64>,
    /// `matrix` decomposed.
    pub parts: Decomposed,
}

/// The layout frame: anchored at the world origin of the node's outer
/// context, oriented like the node, unit scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutFrame {
    /// Layout-to-world transform.
    pub matrix: Matrix4<f64>,
    /// World-to-layout transform.
    pub inverse: Matrix4<f64>,
    /// Layout-to-local transform.
    pub local_from_layout: Matrix4<f64>,
    /// Local-to-layout transform.
    pub layout_from_local: Matrix4<f64>,
}

/// Angular overlap with other adaptive nodes, summed over all of them.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Occlusion {
    /// Overlap with nodes farther from the view than this one.
    pub occluding: f64,
    /// Overlap with nodes nearer to the view than this one.
    pub occluded: f64,
}

/// Transform state for one node in one [`StateMode`].
pub struct NodeState<B: NodeBindings> {
    mode: StateMode,
    node: B::Node,
    cache: Cache,
    local_matrix: Cell<Matrix4<f64>>,
    parent: Cell<Option<B::Node>>,
    world_revision: Cell<u64>,
    local: Memo<Decomposed>,
    world: Memo<WorldFrame>,
    world_center: Memo<Vector3<f64>>,
    layout: Memo<LayoutFrame>,
    layout_bounds: Memo<Box3>,
    outer_bounds: Memo<Box3>,
    screen_bounds: Memo<Box3>,
    visual_frustum: Memo<ViewFrustum>,
    view_aligned: Memo<UnitQuaternion<f64>>,
}

impl<B: NodeBindings> fmt::Debug for NodeState<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeState")
            .field("mode", &self.mode)
            .field("node", &self.node)
            .field("parent", &self.parent.get())
            .field("local_matrix", &self.local_matrix.get())
            .finish_non_exhaustive()
    }
}

/// Runs `f` on another node's resolved state.
fn with_state<B: NodeBindings, R>(
    sys: &System<B>,
    node: B::Node,
    mode: StateMode,
    f: impl FnOnce(&NodeState<B>) -> R,
) -> R {
    let metrics = sys.metrics(node);
    f(metrics.state(sys, mode))
}

const SCREEN_INSET: f64 = 0.999;

impl<B: NodeBindings> NodeState<B> {
    pub(crate) fn new(mode: StateMode, node: B::Node) -> Self {
        Self {
            mode,
            node,
            cache: Cache::new(),
            local_matrix: Cell::new(Matrix4::identity()),
            parent: Cell::new(None),
            world_revision: Cell::new(0),
            local: Memo::new(),
            world: Memo::new(),
            world_center: Memo::new(),
            layout: Memo::new(),
            layout_bounds: Memo::new(),
            outer_bounds: Memo::new(),
            screen_bounds: Memo::new(),
            visual_frustum: Memo::new(),
            view_aligned: Memo::new(),
        }
    }

    /// Which state this is.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> StateMode {
        self.mode
    }

    /// The node this state describes.
    #[inline]
    #[must_use]
    pub fn node(&self) -> B::Node {
        self.node
    }

    /// The parent whose world frame this state is relative to.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<B::Node> {
        self.parent.get()
    }

    /// The authoritative local matrix.
    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> Matrix4<f64> {
        self.local_matrix.get()
    }

    pub(crate) fn set_local_matrix(&self, matrix: Matrix4<f64>) {
        if self.local_matrix.get() != matrix {
            self.local_matrix.set(matrix);
            self.invalidate();
        }
    }

    pub(crate) fn set_parent(&self, parent: Option<B::Node>) {
        if self.parent.get() != parent {
            self.parent.set(parent);
            self.invalidate();
        }
    }

    /// Forces every derived value to recompute on its next read.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
    }

    pub(crate) fn world_token(&self, sys: &System<B>) -> u64 {
        let _ = self.world(sys);
        self.world_revision.get()
    }

    /// Token covering this state's world frame, its own inner bounds, and
    /// its outer context.
    fn frame_token(&self, sys: &System<B>) -> u64 {
        let metrics = sys.metrics(self.node);
        let mut token = self.world_token(sys).max(metrics.inner_token(sys));
        if let Some(outer) = metrics.outer_metrics(sys) {
            token = token.max(outer.inner_token(sys));
            token = token.max(outer.state(sys, self.mode).world_token(sys));
        }
        token
    }

    fn view_world(&self, sys: &System<B>) -> (WorldFrame, u64) {
        if self.node == sys.view_node() {
            (self.world(sys), self.world_revision.get())
        } else {
            with_state(sys, sys.view_node(), self.mode, |view| {
                (view.world(sys), view.world_revision.get())
            })
        }
    }

    fn view_token(&self, sys: &System<B>) -> u64 {
        self.frame_token(sys)
            .max(self.view_world(sys).1)
            .max(sys.frustum_revision())
    }

    // -- local --------------------------------------------------------------

    /// The local matrix decomposed.
    #[must_use]
    pub fn local(&self) -> Decomposed {
        self.local
            .get(&self.cache, || transform::decompose(&self.local_matrix.get()))
    }

    /// Inverse of the local matrix.
    #[must_use]
    pub fn local_matrix_inverse(&self) -> Matrix4<f64> {
        transform::inverse_or_identity(&self.local_matrix.get())
    }

    // -- world --------------------------------------------------------------

    /// The world frame: parent world matrix times local matrix.
    #[must_use]
    pub fn world(&self, sys: &System<B>) -> WorldFrame {
        let parent = self
            .parent
            .get()
            .map(|p| with_state(sys, p, self.mode, |s| (s.world(sys), s.world_revision.get())));
        let token = parent.map_or(0, |(_, revision)| revision);
        self.world.get_coupled(&self.cache, token, || {
            self.world_revision.set(next_revision());
            let local = self.local_matrix.get();
            let matrix = parent.map_or(local, |(frame, _)| frame.matrix * local);
            WorldFrame {
                matrix,
                inverse: transform::inverse_or_identity(&matrix),
                parts: transform::decompose(&matrix),
            }
        })
    }

    /// Local-to-world transform.
    #[must_use]
    pub fn world_matrix(&self, sys: &System<B>) -> Matrix4<f64> {
        self.world(sys).matrix
    }

    /// World-to-local transform.
    #[must_use]
    pub fn world_matrix_inverse(&self, sys: &System<B>) -> Matrix4<f64> {
        self.world(sys).inverse
    }

    /// World translation.
    #[must_use]
    pub fn world_position(&self, sys: &System<B>) -> Vector3<f64> {
        self.world(sys).parts.position
    }

    /// World rotation.
    #[must_use]
    pub fn world_orientation(&self, sys: &System<B>) -> UnitQuaternion<f64> {
        self.world(sys).parts.orientation
    }

    /// World per-axis scale.
    #[must_use]
    pub fn world_scale(&self, sys: &System<B>) -> Vector3<f64> {
        self.world(sys).parts.scale
    }

    /// The center of the node's inner bounds, in world space.
    #[must_use]
    pub fn world_center(&self, sys: &System<B>) -> Vector3<f64> {
        let token = self.frame_token(sys);
        self.world_center.get_coupled(&self.cache, token, || {
            let center = sys.metrics(self.node).inner_bounds(sys).center();
            transform::transform_point(&self.world(sys).matrix, &center)
        })
    }

    /// The world center of the outer context, or the world origin when the
    /// node has none.
    #[must_use]
    pub fn world_origin(&self, sys: &System<B>) -> Vector3<f64> {
        sys.metrics(self.node)
            .outer_metrics(sys)
            .map_or_else(Vector3::zeros, |outer| {
                outer.state(sys, self.mode).world_center(sys)
            })
    }

    // -- layout -------------------------------------------------------------

    /// The layout frame.
    #[must_use]
    pub fn layout(&self, sys: &System<B>) -> LayoutFrame {
        let token = self.frame_token(sys);
        self.layout.get_coupled(&self.cache, token, || {
            let world = self.world(sys);
            let matrix = transform::compose(
                &self.world_origin(sys),
                &world.parts.orientation,
                &Vector3::repeat(1.0),
            );
            let local_from_layout = world.inverse * matrix;
            LayoutFrame {
                matrix,
                inverse: transform::inverse_or_identity(&matrix),
                local_from_layout,
                layout_from_local: transform::inverse_or_identity(&local_from_layout),
            }
        })
    }

    /// Layout-to-world transform.
    #[must_use]
    pub fn layout_matrix(&self, sys: &System<B>) -> Matrix4<f64> {
        self.layout(sys).matrix
    }

    /// Inner bounds expressed in layout space.
    ///
    /// A node with empty inner bounds is treated as a unit cube centered on
    /// its origin.
    #[must_use]
    pub fn layout_bounds(&self, sys: &System<B>) -> Box3 {
        let token = self.frame_token(sys);
        self.layout_bounds.get_coupled(&self.cache, token, || {
            let inner = sys.metrics(self.node).inner_bounds(sys);
            let bounds = if inner.is_empty() {
                Box3::from_center_and_size(Vector3::zeros(), Vector3::repeat(1.0))
            } else {
                inner
            };
            bounds.transformed(&self.layout(sys).layout_from_local)
        })
    }

    /// Center of [`layout_bounds`](Self::layout_bounds).
    #[must_use]
    pub fn layout_center(&self, sys: &System<B>) -> Vector3<f64> {
        self.layout_bounds(sys).center()
    }

    /// Size of [`layout_bounds`](Self::layout_bounds).
    #[must_use]
    pub fn layout_size(&self, sys: &System<B>) -> Vector3<f64> {
        self.layout_bounds(sys).size()
    }

    /// The outer context's inner bounds, re-expressed in this node's layout
    /// space. Empty when there is no outer context.
    #[must_use]
    pub fn outer_bounds(&self, sys: &System<B>) -> Box3 {
        let token = self.frame_token(sys);
        self.outer_bounds.get_coupled(&self.cache, token, || {
            let Some(outer) = sys.metrics(self.node).outer_metrics(sys) else {
                return Box3::EMPTY;
            };
            let inner = outer.inner_bounds(sys);
            if inner.is_empty() {
                return Box3::EMPTY;
            }
            let outer_world = outer.state(sys, self.mode).world(sys).matrix;
            inner.transformed(&(self.layout(sys).inverse * outer_world))
        })
    }

    /// Center of [`outer_bounds`](Self::outer_bounds).
    #[must_use]
    pub fn outer_center(&self, sys: &System<B>) -> Vector3<f64> {
        self.outer_bounds(sys).center()
    }

    /// Size of [`outer_bounds`](Self::outer_bounds).
    #[must_use]
    pub fn outer_size(&self, sys: &System<B>) -> Vector3<f64> {
        self.outer_bounds(sys).size()
    }

    // -- view ---------------------------------------------------------------

    /// Local-to-view transform.
    #[must_use]
    pub fn view_from_local(&self, sys: &System<B>) -> Matrix4<f64> {
        self.view_world(sys).0.inverse * self.world(sys).matrix
    }

    /// Layout-to-view transform.
    #[must_use]
    pub fn view_from_layout(&self, sys: &System<B>) -> Matrix4<f64> {
        self.view_world(sys).0.inverse * self.layout(sys).matrix
    }

    /// View-to-layout transform.
    #[must_use]
    pub fn layout_from_view(&self, sys: &System<B>) -> Matrix4<f64> {
        transform::inverse_or_identity(&self.view_from_layout(sys))
    }

    /// Inner bounds projected into normalized device coordinates.
    ///
    /// The x/y extents are pulled in by 0.1% so that adjacent nodes do not
    /// register overlap along shared edges. The view node itself spans the
    /// whole `[-1, 1]` cube.
    #[must_use]
    pub fn screen_bounds(&self, sys: &System<B>) -> Box3 {
        let token = self.view_token(sys);
        self.screen_bounds.get_coupled(&self.cache, token, || {
            if self.node == sys.view_node() {
                return Box3::new(Vector3::repeat(-1.0), Vector3::repeat(1.0));
            }
            let projection = sys.view_frustum().perspective_projection_matrix();
            let inner = sys.metrics(self.node).inner_bounds(sys);
            let mut bounds = inner.transformed(&(projection * self.view_from_local(sys)));
            if !bounds.is_empty() {
                bounds.min.x *= SCREEN_INSET;
                bounds.max.x *= SCREEN_INSET;
                bounds.min.y *= SCREEN_INSET;
                bounds.max.y *= SCREEN_INSET;
            }
            bounds
        })
    }

    /// Center of [`screen_bounds`](Self::screen_bounds).
    #[must_use]
    pub fn screen_center(&self, sys: &System<B>) -> Vector3<f64> {
        self.screen_bounds(sys).center()
    }

    /// Size of [`screen_bounds`](Self::screen_bounds).
    #[must_use]
    pub fn screen_size(&self, sys: &System<B>) -> Vector3<f64> {
        self.screen_bounds(sys).size()
    }

    /// The node's angular footprint and depth range as seen from the view.
    #[must_use]
    pub fn visual_frustum(&self, sys: &System<B>) -> ViewFrustum {
        let token = self.view_token(sys);
        self.visual_frustum.get_coupled(&self.cache, token, || {
            if self.node == sys.view_node() {
                return sys.view_frustum();
            }
            let screen = self.screen_bounds(sys);
            let projection = sys.view_frustum().perspective_projection_matrix();
            ViewFrustum::from_perspective_projection(&projection, Some(&screen))
        })
    }

    /// The view's world position, in this node's local space.
    #[must_use]
    pub fn relative_view_position(&self, sys: &System<B>) -> Vector3<f64> {
        let view = self.view_world(sys).0;
        transform::transform_point(&self.world(sys).inverse, &view.parts.position)
    }

    /// The axis-aligned local orientation closest to the view's orientation.
    ///
    /// "Up" snaps to the local axis nearest the view's up direction, and
    /// "forward" to the nearest remaining axis.
    #[must_use]
    pub fn view_aligned_orientation(&self, sys: &System<B>) -> UnitQuaternion<f64> {
        let token = self.view_token(sys);
        self.view_aligned.get_coupled(&self.cache, token, || {
            let relative = self.world(sys).inverse * self.view_world(sys).0.matrix;
            let rotation = transform::decompose(&relative).orientation;
            let forward = rotation * Vector3::z();
            let up = rotation * Vector3::y();

            let axes = [
                Vector3::x(),
                -Vector3::x(),
                Vector3::y(),
                -Vector3::y(),
                Vector3::z(),
                -Vector3::z(),
            ];
            let nearest = |direction: &Vector3<f64>, skip: Option<usize>| {
                axes.iter()
                    .enumerate()
                    .filter(|(i, _)| skip.is_none_or(|s| i / 2 != s / 2))
                    .min_by(|(_, a), (_, b)| {
                        (*a - direction)
                            .norm_squared()
                            .total_cmp(&(*b - direction).norm_squared())
                    })
                    .map_or(0, |(i, _)| i)
            };
            let up_index = nearest(&up, None);
            let forward_index = nearest(&forward, Some(up_index));
            UnitQuaternion::face_towards(&axes[forward_index], &axes[up_index])
        })
    }

    /// Angular overlap with every other adaptive node in the same mode.
    ///
    /// Each overlap is the fraction of this node's angular area covered by the
    /// other node. Overlaps are summed as-is: they are not weighted by how far
    /// apart the two nodes are in depth, only sorted into
    /// [`Occlusion::occluding`] or [`Occlusion::occluded`] by which near plane
    /// is closer. Nodes with empty inner bounds, and nodes in this node's own
    /// ancestor or descendant chain, are not considered.
    #[must_use]
    pub fn occlusion(&self, sys: &System<B>) -> Occlusion {
        let mut occlusion = Occlusion::default();
        let metrics = sys.metrics(self.node);
        if metrics.inner_bounds(sys).is_empty() {
            return occlusion;
        }
        let mine = self.visual_frustum(sys);

        for other in sys.adaptive_metrics() {
            let node = other.node();
            if node == self.node || other.inner_bounds(sys).is_empty() {
                continue;
            }
            if metrics.contains_node(sys, node).is_some()
                || metrics.contained_by_node(sys, node).is_some()
            {
                continue;
            }
            let theirs = other.state(sys, self.mode).visual_frustum(sys);
            let overlap = mine.overlap_percent(&theirs);
            if overlap > 0.0 {
                if mine.near_meters < theirs.near_meters {
                    occlusion.occluding += overlap;
                } else {
                    occlusion.occluded += overlap;
                }
            }
        }
        occlusion
    }

    /// Overlap with farther adaptive nodes.
    #[must_use]
    pub fn occluding_percent(&self, sys: &System<B>) -> f64 {
        self.occlusion(sys).occluding
    }

    /// Overlap with nearer adaptive nodes.
    #[must_use]
    pub fn occluded_percent(&self, sys: &System<B>) -> f64 {
        self.occlusion(sys).occluded
    }

    /// An owned copy of this state, suitable for
    /// [`NodeBindings::apply`].
    #[must_use]
    pub fn snapshot(&self, sys: &System<B>) -> StateSnapshot<B::Node> {
        let local = self.local();
        let opacity = sys
            .existing_adapter(self.node)
            .map_or(1.0, |adapter| match self.mode {
                StateMode::Current => adapter.opacity().current(),
                StateMode::Target => adapter.opacity().target(),
            });
        StateSnapshot {
            parent: self.parent.get(),
            local_matrix: self.local_matrix.get(),
            world_matrix: self.world(sys).matrix,
            position: local.position,
            orientation: local.orientation,
            scale: local.scale,
            opacity,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
