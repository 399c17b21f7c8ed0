// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental swarm search over layout samples.
//!
//! Every [`SpatialLayout`] keeps a small swarm of scored samples. Each system
//! update runs a fixed number of iterations per presentable layout, so the
//! per-frame cost does not depend on how long a layout has been searching.
//!
//! One iteration picks the next swarm member in round-robin order and
//! proposes a move:
//!
//! - with probability `pulse_rate`, a pulse toward the swarm leader by a
//!   random fraction in `[pulse_frequency_min, pulse_frequency_max]`,
//!   jittered by a tenth of the step size;
//! - otherwise a random walk of the full step size.
//!
//! The member is replaced when the proposal ranks ahead of it. A proposal
//! only becomes the layout's best when it is feasible and improves the best
//! score beyond tolerance, so the recorded best score never increases while
//! the constraints stay fixed.
//!
//! The step size follows a one-fifth success rule over a moving average of
//! member improvements. When the average decays below `success_rate_min` the
//! swarm is considered stale and its worst members restart from random
//! samples around the node's natural pose.

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use nalgebra::{UnitQuaternion, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::adapter::SpatialAdapter;
use crate::bindings::NodeBindings;
use crate::bounds::Box3;
use crate::layout::{LayoutContext, LayoutSample, Scored, SpatialLayout};
use crate::system::System;

/// Tuning knobs for [`SpatialOptimizer`].
#[derive(Clone, Copy, Debug)]
pub struct OptimizerConfig {
    /// Constraint values up to this are treated as satisfied.
    pub constraint_threshold: f64,
    /// Minimum relative score improvement for a new best.
    pub relative_tolerance: f64,
    /// Minimum absolute score improvement for a new best.
    pub absolute_tolerance: f64,
    /// Iterations per layout per system update.
    pub iterations_per_frame: usize,
    /// Samples kept per layout.
    pub swarm_size: usize,
    /// Smallest fraction of the way a pulse moves toward the leader.
    pub pulse_frequency_min: f64,
    /// Largest fraction of the way a pulse moves toward the leader.
    pub pulse_frequency_max: f64,
    /// Probability that an iteration pulses instead of walking.
    pub pulse_rate: f64,
    /// Lower step-size clamp.
    pub step_size_min: f64,
    /// Upper step-size clamp. Also the spread of restarted samples.
    pub step_size_max: f64,
    /// Step size after seeding or a restart.
    pub step_size_start: f64,
    /// Fraction of the swarm restarted when stale.
    pub stale_restart_rate: f64,
    /// Window, in iterations, of the success-rate moving average.
    pub success_rate_moving_average: f64,
    /// Success rate below which a swarm is stale.
    pub success_rate_min: f64,
    /// Seed for the optimizer's random stream.
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            constraint_threshold: 1.0,
            relative_tolerance: 1e-3,
            absolute_tolerance: 1e-5,
            iterations_per_frame: 4,
            swarm_size: 10,
            pulse_frequency_min: 0.3,
            pulse_frequency_max: 1.0,
            pulse_rate: 0.5,
            step_size_min: 0.01,
            step_size_max: 1.5,
            step_size_start: 0.3,
            stale_restart_rate: 0.1,
            success_rate_moving_average: 200.0,
            success_rate_min: 0.005,
            seed: 0,
        }
    }
}

impl OptimizerConfig {
    /// The smallest improvement over `best` that counts.
    #[inline]
    #[must_use]
    pub fn tolerance(&self, best: f64) -> f64 {
        self.absolute_tolerance.max(self.relative_tolerance * best.abs())
    }
}

/// Success rate assumed after seeding or restarting a swarm.
const INITIAL_SUCCESS_RATE: f64 = 0.2;

/// Drives every layout's swarm search. Owned by the [`System`].
pub struct SpatialOptimizer {
    rng: RefCell<Pcg32>,
}

impl fmt::Debug for SpatialOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialOptimizer").finish_non_exhaustive()
    }
}

impl SpatialOptimizer {
    /// Creates an optimizer with a deterministic random stream.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(Pcg32::seed_from_u64(seed)),
        }
    }

    /// Restarts the random stream.
    pub fn reseed(&self, seed: u64) {
        *self.rng.borrow_mut() = Pcg32::seed_from_u64(seed);
    }

    /// Runs one frame's worth of search on `layout`.
    ///
    /// Seeds the swarm on first use, re-scores the stored best so that it
    /// reflects the current scene, then runs exactly
    /// `config.iterations_per_frame` iterations.
    ///
    /// # Panics
    ///
    /// Panics if `config.swarm_size` is zero.
    pub fn optimize<B: NodeBindings>(
        &self,
        sys: &System<B>,
        adapter: &SpatialAdapter<B>,
        layout: &SpatialLayout<B>,
        config: &OptimizerConfig,
    ) {
        assert!(config.swarm_size > 0, "swarm size must be positive");
        let natural = adapter.natural_sample(sys, layout);

        if layout.solver().borrow().swarm.is_empty() {
            self.seed(sys, adapter, layout, &natural, config);
        } else {
            let best = layout.solver().borrow().best;
            if let Some(best) = best {
                let rescored = score(sys, adapter, layout, best.sample, config);
                layout.solver().borrow_mut().best = rescored.is_feasible().then_some(rescored);
            }
        }

        for _ in 0..config.iterations_per_frame {
            self.iterate(sys, adapter, layout, &natural, config);
        }
    }

    fn seed<B: NodeBindings>(
        &self,
        sys: &System<B>,
        adapter: &SpatialAdapter<B>,
        layout: &SpatialLayout<B>,
        natural: &LayoutSample,
        config: &OptimizerConfig,
    ) {
        let mut samples = vec![*natural];
        {
            let mut rng = self.rng.borrow_mut();
            while samples.len() < config.swarm_size {
                samples.push(perturb(&mut rng, natural, config.step_size_start));
            }
        }
        let swarm: Vec<Scored> = samples
            .into_iter()
            .map(|sample| score(sys, adapter, layout, sample, config))
            .collect();
        let best = swarm
            .iter()
            .filter(|s| s.is_feasible())
            .min_by(|a, b| a.rank(b))
            .copied();

        let mut solver = layout.solver().borrow_mut();
        solver.swarm = swarm;
        solver.best = best;
        solver.step_size = config.step_size_start;
        solver.success_rate = INITIAL_SUCCESS_RATE;
        solver.cursor = 0;
    }

    fn iterate<B: NodeBindings>(
        &self,
        sys: &System<B>,
        adapter: &SpatialAdapter<B>,
        layout: &SpatialLayout<B>,
        natural: &LayoutSample,
        config: &OptimizerConfig,
    ) {
        let (index, member, leader, step) = {
            let solver = layout.solver().borrow();
            let index = solver.cursor % solver.swarm.len();
            let member = solver.swarm[index];
            let leader = solver
                .swarm
                .iter()
                .min_by(|a, b| a.rank(b))
                .copied()
                .unwrap_or(member);
            (index, member, leader, solver.step_size)
        };

        let proposal = {
            let mut rng = self.rng.borrow_mut();
            if rng.gen_range(0.0..1.0) < config.pulse_rate {
                let span = config.pulse_frequency_max - config.pulse_frequency_min;
                let frequency = config.pulse_frequency_min + span * rng.gen_range(0.0..=1.0);
                let moved = toward(&member.sample, &leader.sample, frequency);
                perturb(&mut rng, &moved, step * 0.1)
            } else {
                perturb(&mut rng, &member.sample, step)
            }
        };
        let candidate = score(sys, adapter, layout, proposal, config);
        let improved = candidate.beats(&member);

        let stale = {
            let mut solver = layout.solver().borrow_mut();
            solver.iterations += 1;
            solver.cursor = solver.cursor.wrapping_add(1);
            if improved {
                solver.swarm[index] = candidate;
            }
            if candidate.is_feasible()
                && solver
                    .best
                    .is_none_or(|best| candidate.score < best.score - config.tolerance(best.score))
            {
                solver.best = Some(candidate);
            }

            let alpha = 1.0 / config.success_rate_moving_average.max(1.0);
            let hit = if improved { 1.0 } else { 0.0 };
            solver.success_rate += alpha * (hit - solver.success_rate);
            let grow = if solver.success_rate > 0.2 { 1.1 } else { 0.98 };
            solver.step_size =
                (solver.step_size * grow).clamp(config.step_size_min, config.step_size_max);
            solver.success_rate < config.success_rate_min
        };

        if stale {
            self.restart(sys, adapter, layout, natural, config);
        }
    }

    /// Replaces the worst members with random samples around `natural`.
    fn restart<B: NodeBindings>(
        &self,
        sys: &System<B>,
        adapter: &SpatialAdapter<B>,
        layout: &SpatialLayout<B>,
        natural: &LayoutSample,
        config: &OptimizerConfig,
    ) {
        let worst: Vec<usize> = {
            let solver = layout.solver().borrow();
            let len = solver.swarm.len();
            #[expect(
                clippy::cast_possible_truncation,
                reason = "restart count is bounded by the swarm length"
            )]
            let count = ((config.stale_restart_rate * len as f64).ceil() as usize).clamp(1, len);
            let mut order: Vec<usize> = (0..len).collect();
            order.sort_by(|&a, &b| solver.swarm[b].rank(&solver.swarm[a]));
            order.truncate(count);
            order
        };

        let samples: Vec<LayoutSample> = {
            let mut rng = self.rng.borrow_mut();
            worst
                .iter()
                .map(|_| perturb(&mut rng, natural, config.step_size_max))
                .collect()
        };
        let fresh: Vec<Scored> = samples
            .into_iter()
            .map(|sample| score(sys, adapter, layout, sample, config))
            .collect();

        let mut solver = layout.solver().borrow_mut();
        for (index, scored) in worst.into_iter().zip(fresh) {
            solver.swarm[index] = scored;
        }
        solver.step_size = config.step_size_start;
        solver.success_rate = INITIAL_SUCCESS_RATE;
        solver.restarts += 1;
    }
}

/// Scores `sample` by resolving the node's target state under it.
fn score<B: NodeBindings>(
    sys: &System<B>,
    adapter: &SpatialAdapter<B>,
    layout: &SpatialLayout<B>,
    sample: LayoutSample,
    config: &OptimizerConfig,
) -> Scored {
    adapter.set_candidate(Some(sample));
    let ctx = LayoutContext {
        system: sys,
        adapter,
        sample: &sample,
    };
    let (score, violation) = layout.evaluate(&ctx, config.constraint_threshold);
    adapter.set_candidate(None);
    Scored {
        sample,
        score,
        violation,
    }
}

fn jitter(rng: &mut Pcg32) -> Vector3<f64> {
    Vector3::new(
        rng.gen_range(-1.0..=1.0),
        rng.gen_range(-1.0..=1.0),
        rng.gen_range(-1.0..=1.0),
    )
}

/// A random neighbor of `sample` at distance proportional to `step`.
fn perturb(rng: &mut Pcg32, sample: &LayoutSample, step: f64) -> LayoutSample {
    let orientation = sample
        .orientation
        .map(|q| UnitQuaternion::from_scaled_axis(jitter(rng) * step) * q);
    let bounds = sample.bounds.map(|b| {
        if b.is_empty() {
            return b;
        }
        let size = b.size();
        let center = b.center() + jitter(rng) * (step * size.norm());
        let stretch = jitter(rng).map(|u| (u * step).exp());
        Box3::from_center_and_size(center, size.component_mul(&stretch))
    });
    LayoutSample {
        orientation,
        bounds,
    }
}

/// Moves `from` a fraction `t` of the way toward `to`.
fn toward(from: &LayoutSample, to: &LayoutSample, t: f64) -> LayoutSample {
    let orientation = match (from.orientation, to.orientation) {
        (Some(a), Some(b)) => Some(a.try_slerp(&b, t, 1e-9).unwrap_or(a)),
        (a, _) => a,
    };
    let bounds = match (from.bounds, to.bounds) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(a.lerp(&b, t)),
        (a, _) => a,
    };
    LayoutSample {
        orientation,
        bounds,
    }
}

/// Picks the active layout among `presentable`.
///
/// The first layout, in priority order, whose best sample is feasible is the
/// challenger. It displaces a still-feasible incumbent only when its best
/// score is lower by more than [`OptimizerConfig::tolerance`]. When nothing
/// is feasible the incumbent stays active as long as it is still
/// presentable.
pub(crate) fn select_layout<B: NodeBindings>(
    incumbent: Option<&Rc<SpatialLayout<B>>>,
    presentable: &[Rc<SpatialLayout<B>>],
    config: &OptimizerConfig,
) -> Option<Rc<SpatialLayout<B>>> {
    let incumbent =
        incumbent.filter(|current| presentable.iter().any(|l| Rc::ptr_eq(l, *current)));
    let Some((challenger, score)) = presentable.iter().find_map(|layout| {
        let best = layout.best().filter(Scored::is_feasible)?;
        Some((layout, best.score))
    }) else {
        return incumbent.cloned();
    };
    if let Some(current) = incumbent
        && let Some(held) = current.best().filter(Scored::is_feasible)
        && held.score - score <= config.tolerance(held.score)
    {
        return Some(current.clone());
    }
    Some(challenger.clone())
}
