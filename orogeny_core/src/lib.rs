// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive 3D layout for externally owned scene graphs.
//!
//! `orogeny_core` computes where nodes of a host scene graph should be
//! (orientation, bounding box, opacity), keeps searching for better
//! placements every frame, and blends nodes smoothly into place. The host
//! owns the nodes; the engine reads and writes them only through
//! [`NodeBindings`](bindings::NodeBindings).
//!
//! # Architecture
//!
//! One [`System`](system::System) per layout session. The host calls
//! `update` once per frame:
//!
//! ```text
//!   Host frame
//!       │
//!       ▼
//!   System::update(dt, time)
//!       │
//!       ├─► Invalidate ──► SpatialMetrics (dirty)
//!       ├─► Transition ──► Transitionable::update (registration order)
//!       ├─► ResolveView ─► view metrics, view frustum
//!       └─► Optimize ───► SpatialAdapter::update
//!                             │
//!                             ├─► SpatialOptimizer::optimize (per layout)
//!                             └─► retarget Transitionables (blend next frame)
//!       │
//!       ▼
//!   System::apply(node) ──► NodeBindings::apply
//! ```
//!
//! **[`cache`]**: Memoized values with manual dirty flags and explicit
//! coupling to other caches.
//!
//! **[`bindings`]**: The four-operation capability trait the host implements.
//!
//! **[`metrics`]**: Per-node records: raw host state, intrinsic and inner
//! bounds, hierarchy queries, and the current/target [`NodeState`]s.
//!
//! **[`state`]**: [`NodeState`] derives world, layout, view, screen, and
//! visual (angular) frames for one node, lazily.
//!
//! **[`adapter`]**: Opts a node into adaptive layout and owns its
//! transitionables and candidate layouts.
//!
//! **[`layout`]** and **[`terms`]**: Candidate layouts as weighted
//! constraints and objectives, with a library of reusable terms.
//!
//! **[`optimizer`]**: Incremental swarm search, a bounded number of
//! iterations per layout per frame.
//!
//! **[`transition`]**: Guaranteed-settling value blending.
//!
//! **[`frustum`]**, **[`bounds`]**, **[`transform`]**, **[`easing`]**:
//! Geometry helpers.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! update instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-layout
//!   optimizer score records.
//!
//! [`NodeState`]: state::NodeState

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod adapter;
pub mod bindings;
pub mod bounds;
pub mod cache;
pub mod easing;
pub mod frustum;
pub mod layout;
pub mod metrics;
pub mod optimizer;
pub mod state;
pub mod system;
pub mod terms;
pub mod trace;
pub mod transform;
pub mod transition;

#[cfg(test)]
mod testing;
