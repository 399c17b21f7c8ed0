// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The capability through which the engine reads and writes host nodes.
//!
//! The engine never inspects a node directly. Everything it knows about the
//! host scene graph comes through [`NodeBindings`], and everything it
//! computes is handed back as a [`StateSnapshot`] when the host asks for it
//! via [`System::apply`](crate::system::System::apply).

use core::fmt::Debug;
use core::hash::Hash;

use nalgebra::{Matrix4, UnitQuaternion, Vector3};

use crate::bounds::Box3;

/// What a host node reports about itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeSnapshot<N> {
    /// Transform from this node's space into its parent's space.
    pub local_matrix: Matrix4<f64>,
    /// The node's current scene-graph parent.
    pub parent: Option<N>,
    /// The node's perspective projection, for camera-like nodes.
    ///
    /// Only read for the system's view node, where it refreshes the system
    /// view frustum.
    pub projection: Option<Matrix4<f64>>,
}

impl<N> NodeSnapshot<N> {
    /// A snapshot without a projection.
    #[inline]
    #[must_use]
    pub const fn new(local_matrix: Matrix4<f64>, parent: Option<N>) -> Self {
        Self {
            local_matrix,
            parent,
            projection: None,
        }
    }

    /// Attaches a perspective projection.
    #[inline]
    #[must_use]
    pub fn with_projection(mut self, projection: Matrix4<f64>) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// A computed node state, ready to be written back onto a host node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateSnapshot<N> {
    /// Parent the node should be attached to.
    pub parent: Option<N>,
    /// Transform into the parent's space.
    pub local_matrix: Matrix4<f64>,
    /// Transform into world space.
    pub world_matrix: Matrix4<f64>,
    /// Local translation.
    pub position: Vector3<f64>,
    /// Local rotation.
    pub orientation: UnitQuaternion<f64>,
    /// Local per-axis scale.
    pub scale: Vector3<f64>,
    /// Opacity in `[0, 1]`. Always `1` for nodes without an adapter.
    pub opacity: f64,
}

/// Read/write access to an externally owned scene graph.
///
/// The engine is generic over this trait and never over a concrete node
/// type. Node handles are cheap identities: the engine stores them as map
/// keys and compares them, nothing more.
pub trait NodeBindings: 'static {
    /// Opaque node identity.
    type Node: Copy + Eq + Hash + Debug + 'static;

    /// Appends the node's children to `out`.
    ///
    /// `out` is empty on entry.
    fn children(&self, node: Self::Node, out: &mut Vec<Self::Node>);

    /// Reads the node's authoritative local transform and parent.
    fn state(&self, node: Self::Node) -> NodeSnapshot<Self::Node>;

    /// Bounds of geometry attached directly to the node, excluding children,
    /// in the node's local space. Return [`Box3::EMPTY`] for none.
    fn intrinsic_bounds(&self, node: Self::Node) -> Box3;

    /// Writes a computed state back onto the node.
    ///
    /// Only called from [`System::apply`](crate::system::System::apply);
    /// the per-frame update never writes to host nodes.
    fn apply(&mut self, node: Self::Node, state: &StateSnapshot<Self::Node>);
}
