// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Candidate layouts and their scoring.
//!
//! A [`SpatialLayout`] is one way of placing an adaptive node: a set of
//! weighted constraints and objectives evaluated against a
//! [`LayoutSample`]. Constraints report a violation (zero when satisfied);
//! objectives report a cost. Lower scores are better.
//!
//! Each layout keeps the optimizer's per-layout solver state: its swarm of
//! scored samples, its best feasible sample, and step-size bookkeeping.
//! See [`SpatialOptimizer`](crate::optimizer::SpatialOptimizer).

use core::cell::{Cell, Ref, RefCell};
use core::cmp::Ordering;
use core::fmt;
use std::rc::Rc;

use nalgebra::UnitQuaternion;

use crate::adapter::SpatialAdapter;
use crate::bindings::NodeBindings;
use crate::bounds::Box3;
use crate::metrics::SpatialMetrics;
use crate::state::NodeState;
use crate::system::System;

/// Values a layout may drive. `None` leaves that aspect to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayoutSample {
    /// Local orientation.
    pub orientation: Option<UnitQuaternion<f64>>,
    /// Layout-space bounds the node's inner bounds are fitted into.
    pub bounds: Option<Box3>,
}

/// A sample together with its evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scored {
    /// The evaluated sample.
    pub sample: LayoutSample,
    /// Weighted objective sum.
    pub score: f64,
    /// Weighted constraint violation beyond the configured threshold.
    pub violation: f64,
}

impl Scored {
    /// Returns `true` if no constraint is violated beyond the threshold and
    /// the score is finite.
    #[inline]
    #[must_use]
    pub fn is_feasible(&self) -> bool {
        self.violation == 0.0 && self.score.is_finite()
    }

    /// Orders feasible samples first, then by violation, then by score.
    #[must_use]
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .is_feasible()
            .cmp(&self.is_feasible())
            .then(self.violation.total_cmp(&other.violation))
            .then(self.score.total_cmp(&other.score))
    }

    /// Returns `true` if `self` ranks strictly ahead of `other`.
    #[inline]
    #[must_use]
    pub fn beats(&self, other: &Self) -> bool {
        self.rank(other) == Ordering::Less
    }
}

/// What a constraint or objective sees: the candidate sample and the node's
/// target state resolved under it.
pub struct LayoutContext<'a, B: NodeBindings> {
    /// The owning system.
    pub system: &'a System<B>,
    /// The adapter being optimized.
    pub adapter: &'a SpatialAdapter<B>,
    /// The candidate under evaluation.
    pub sample: &'a LayoutSample,
}

impl<B: NodeBindings> fmt::Debug for LayoutContext<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutContext")
            .field("node", &self.adapter.node())
            .field("sample", self.sample)
            .finish_non_exhaustive()
    }
}

impl<'a, B: NodeBindings> LayoutContext<'a, B> {
    /// The node's metrics.
    #[must_use]
    pub fn metrics(&self) -> &'a SpatialMetrics<B> {
        self.adapter.metrics()
    }

    /// The node's target state with the candidate applied.
    #[must_use]
    pub fn state(&self) -> &'a NodeState<B> {
        self.adapter.metrics().target_state(self.system)
    }
}

type TermFn<B> = dyn Fn(&LayoutContext<'_, B>) -> f64;

struct Term<B: NodeBindings> {
    weight: f64,
    eval: Rc<TermFn<B>>,
}

impl<B: NodeBindings> Clone for Term<B> {
    fn clone(&self) -> Self {
        Self {
            weight: self.weight,
            eval: self.eval.clone(),
        }
    }
}

/// Per-layout optimizer state.
#[derive(Clone, Debug)]
pub(crate) struct SolverState {
    pub(crate) swarm: Vec<Scored>,
    pub(crate) best: Option<Scored>,
    pub(crate) step_size: f64,
    pub(crate) success_rate: f64,
    pub(crate) cursor: usize,
    pub(crate) iterations: u64,
    pub(crate) restarts: u64,
}

impl SolverState {
    const fn new() -> Self {
        Self {
            swarm: Vec::new(),
            best: None,
            step_size: 0.0,
            success_rate: 0.0,
            cursor: 0,
            iterations: 0,
            restarts: 0,
        }
    }
}

/// A named candidate layout owned by one adapter.
pub struct SpatialLayout<B: NodeBindings> {
    name: String,
    id: u32,
    owner: B::Node,
    controls_orientation: Cell<bool>,
    controls_bounds: Cell<bool>,
    constraints: RefCell<Vec<Term<B>>>,
    objectives: RefCell<Vec<Term<B>>>,
    solver: RefCell<SolverState>,
}

impl<B: NodeBindings> fmt::Debug for SpatialLayout<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialLayout")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("constraints", &self.constraints.borrow().len())
            .field("objectives", &self.objectives.borrow().len())
            .field("best", &self.solver.borrow().best)
            .finish_non_exhaustive()
    }
}

impl<B: NodeBindings> SpatialLayout<B> {
    pub(crate) fn new(name: String, id: u32, owner: B::Node) -> Self {
        Self {
            name,
            id,
            owner,
            controls_orientation: Cell::new(true),
            controls_bounds: Cell::new(true),
            constraints: RefCell::new(Vec::new()),
            objectives: RefCell::new(Vec::new()),
            solver: RefCell::new(SolverState::new()),
        }
    }

    /// The layout's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier, unique among its adapter's layouts.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The node whose adapter created this layout.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> B::Node {
        self.owner
    }

    /// Whether the layout drives the node's orientation.
    #[must_use]
    pub fn controls_orientation(&self) -> bool {
        self.controls_orientation.get()
    }

    /// Sets whether the layout drives the node's orientation.
    pub fn set_controls_orientation(&self, controls: bool) -> &Self {
        self.controls_orientation.set(controls);
        self
    }

    /// Whether the layout drives the node's bounds.
    #[must_use]
    pub fn controls_bounds(&self) -> bool {
        self.controls_bounds.get()
    }

    /// Sets whether the layout drives the node's bounds.
    pub fn set_controls_bounds(&self, controls: bool) -> &Self {
        self.controls_bounds.set(controls);
        self
    }

    /// Adds a constraint. `term` returns a violation, `0` when satisfied.
    pub fn add_constraint(
        &self,
        weight: f64,
        term: impl Fn(&LayoutContext<'_, B>) -> f64 + 'static,
    ) -> &Self {
        self.constraints.borrow_mut().push(Term {
            weight,
            eval: Rc::new(term),
        });
        self
    }

    /// Adds an objective. `term` returns a cost to minimize.
    pub fn add_objective(
        &self,
        weight: f64,
        term: impl Fn(&LayoutContext<'_, B>) -> f64 + 'static,
    ) -> &Self {
        self.objectives.borrow_mut().push(Term {
            weight,
            eval: Rc::new(term),
        });
        self
    }

    /// The best feasible sample found so far.
    #[must_use]
    pub fn best(&self) -> Option<Scored> {
        self.solver.borrow().best
    }

    /// The current swarm.
    #[must_use]
    pub fn swarm(&self) -> Ref<'_, [Scored]> {
        Ref::map(self.solver.borrow(), |s| s.swarm.as_slice())
    }

    /// Total optimizer iterations run on this layout.
    #[must_use]
    pub fn iterations(&self) -> u64 {
        self.solver.borrow().iterations
    }

    /// Number of stale restarts.
    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.solver.borrow().restarts
    }

    /// Current exploration step size.
    #[must_use]
    pub fn step_size(&self) -> f64 {
        self.solver.borrow().step_size
    }

    /// Moving average of iterations that improved a swarm member.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        self.solver.borrow().success_rate
    }

    /// Discards the swarm and best sample. The next optimizer pass reseeds.
    pub fn reset(&self) {
        *self.solver.borrow_mut() = SolverState::new();
    }

    pub(crate) fn solver(&self) -> &RefCell<SolverState> {
        &self.solver
    }

    /// Evaluates every term against `ctx`.
    ///
    /// Returns the weighted objective sum and the weighted sum of constraint
    /// violations in excess of `threshold`. Non-finite term values make the
    /// sample infeasible.
    pub(crate) fn evaluate(&self, ctx: &LayoutContext<'_, B>, threshold: f64) -> (f64, f64) {
        let constraints = self.constraints.borrow().clone();
        let objectives = self.objectives.borrow().clone();

        let mut violation = 0.0;
        for term in &constraints {
            let v = (term.eval)(ctx);
            if !v.is_finite() {
                return (f64::INFINITY, f64::INFINITY);
            }
            violation += term.weight * (v - threshold).max(0.0);
        }
        let mut score = 0.0;
        for term in &objectives {
            let v = (term.eval)(ctx);
            if !v.is_finite() {
                return (f64::INFINITY, f64::INFINITY);
            }
            score += term.weight * v;
        }
        (score, violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(score: f64, violation: f64) -> Scored {
        Scored {
            sample: LayoutSample::default(),
            score,
            violation,
        }
    }

    #[test]
    fn feasible_samples_rank_first() {
        let feasible = scored(10.0, 0.0);
        let infeasible = scored(-10.0, 0.5);
        assert!(feasible.beats(&infeasible), "feasibility dominates score");
        assert!(!infeasible.beats(&feasible), "and not the other way around");
    }

    #[test]
    fn infeasible_samples_rank_by_violation() {
        assert!(scored(5.0, 0.1).beats(&scored(0.0, 0.2)), "smaller violation");
        assert!(scored(0.0, 0.1).beats(&scored(5.0, 0.1)), "then score");
    }

    #[test]
    fn equal_samples_do_not_beat_each_other() {
        let a = scored(1.0, 0.0);
        assert!(!a.beats(&a), "strict ordering");
    }

    #[test]
    fn non_finite_score_is_infeasible() {
        assert!(!scored(f64::NAN, 0.0).is_feasible(), "NaN score");
        assert!(!scored(f64::INFINITY, 0.0).is_feasible(), "infinite score");
    }
}
