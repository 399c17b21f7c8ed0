// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory scene graph for unit tests.

use indexmap::IndexMap;
use nalgebra::Matrix4;

use crate::bindings::{NodeBindings, NodeSnapshot, StateSnapshot};
use crate::bounds::Box3;

/// Handle to a [`TestScene`] node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

#[derive(Debug)]
struct TestNode {
    parent: Option<NodeId>,
    local: Matrix4<f64>,
    bounds: Box3,
    projection: Option<Matrix4<f64>>,
}

/// A flat node table. Children are reported in insertion order.
#[derive(Debug, Default)]
pub(crate) struct TestScene {
    nodes: IndexMap<NodeId, TestNode>,
    /// Every state written back through [`NodeBindings::apply`], in order.
    pub(crate) applied: Vec<(NodeId, StateSnapshot<NodeId>)>,
}

impl TestScene {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &mut self,
        parent: Option<NodeId>,
        local: Matrix4<f64>,
        bounds: Box3,
    ) -> NodeId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "test scenes stay far below u32::MAX nodes"
        )]
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.insert(
            id,
            TestNode {
                parent,
                local,
                bounds,
                projection: None,
            },
        );
        id
    }

    /// Deletes `node`. Its children become roots. Reading a removed node
    /// through [`NodeBindings`] panics.
    pub(crate) fn remove(&mut self, node: NodeId) {
        self.nodes.shift_remove(&node);
        for n in self.nodes.values_mut() {
            if n.parent == Some(node) {
                n.parent = None;
            }
        }
    }

    fn node_mut(&mut self, node: NodeId) -> &mut TestNode {
        self.nodes.get_mut(&node).expect("unknown test node")
    }

    pub(crate) fn set_local(&mut self, node: NodeId, local: Matrix4<f64>) {
        self.node_mut(node).local = local;
    }

    pub(crate) fn set_bounds(&mut self, node: NodeId, bounds: Box3) {
        self.node_mut(node).bounds = bounds;
    }

    pub(crate) fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>) {
        self.node_mut(node).parent = parent;
    }

    pub(crate) fn set_projection(&mut self, node: NodeId, projection: Matrix4<f64>) {
        self.node_mut(node).projection = Some(projection);
    }
}

impl NodeBindings for TestScene {
    type Node = NodeId;

    fn children(&self, node: NodeId, out: &mut Vec<NodeId>) {
        out.extend(
            self.nodes
                .iter()
                .filter(|(_, n)| n.parent == Some(node))
                .map(|(&id, _)| id),
        );
    }

    fn state(&self, node: NodeId) -> NodeSnapshot<NodeId> {
        let n = &self.nodes[&node];
        NodeSnapshot {
            local_matrix: n.local,
            parent: n.parent,
            projection: n.projection,
        }
    }

    fn intrinsic_bounds(&self, node: NodeId) -> Box3 {
        self.nodes[&node].bounds
    }

    fn apply(&mut self, node: NodeId, state: &StateSnapshot<NodeId>) {
        let n = self.node_mut(node);
        n.local = state.local_matrix;
        n.parent = state.parent;
        self.applied.push((node, *state));
    }
}
