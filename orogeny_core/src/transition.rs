// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Guaranteed-settling temporal filtering of values.
//!
//! A [`Transitionable`] drives its `current` value toward a `target`. Target
//! changes are first *committed* (once they exceed the configured threshold
//! and the delay and debounce windows have passed), and each commit starts a
//! transition segment of fixed duration. Segments are chained as a finite
//! impulse response: starting from the value at the oldest live segment, each
//! segment interpolates toward its own target by its eased progress. Once the
//! newest segment completes, `current` equals `target` exactly, so a commit
//! always settles within one segment duration.
//!
//! Independently of blending, no value stays away from its target for longer
//! than [`TransitionConfig::max_wait`]: past that point `current` snaps.

use core::cell::RefCell;
use core::fmt;
use std::collections::VecDeque;

use nalgebra::{UnitQuaternion, Vector3};

use crate::bounds::Box3;
use crate::easing::{self, Easing};

/// Blending parameters for a [`Transitionable`].
///
/// Times are in seconds.
#[derive(Clone, Copy, Debug)]
pub struct TransitionConfig {
    /// Scales [`duration`](Self::duration).
    pub multiplier: f64,
    /// Length of one transition segment.
    pub duration: f64,
    /// Easing curve applied to each segment's progress.
    pub easing: Easing,
    /// Minimum distance between the target and the last committed target
    /// before a new commit happens.
    pub threshold: f64,
    /// Time a target change must be pending before it is committed.
    pub delay: f64,
    /// Time the target must stay unchanged before it is committed.
    pub debounce: f64,
    /// Upper bound on the time `current` may differ from `target`.
    pub max_wait: f64,
    /// When `false`, committed targets are assigned without interpolation.
    pub blend: bool,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            duration: 0.0,
            easing: easing::ease_in_out,
            threshold: 0.0001,
            delay: 0.0,
            debounce: 0.0,
            max_wait: 10.0,
            blend: true,
        }
    }
}

impl TransitionConfig {
    /// Effective segment length (`duration * multiplier`).
    #[inline]
    #[must_use]
    pub fn segment_duration(&self) -> f64 {
        self.duration * self.multiplier
    }
}

/// Error returned when a transition value is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionError {
    /// The value contains `NaN` or an infinite component.
    NonFinite,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinite => f.write_str("transition value is not finite"),
        }
    }
}

impl core::error::Error for TransitionError {}

/// A value type that can be blended by a [`Transitionable`].
pub trait TransitionValue: Clone + fmt::Debug + 'static {
    /// Interpolates from `self` toward `to` by `t` in `[0, 1]`.
    fn lerp(&self, to: &Self, t: f64) -> Self;

    /// Distance used for threshold comparisons.
    ///
    /// Scalars and vectors use absolute distance, orientations use the angle
    /// in radians, boxes use distance relative to their size.
    fn distance(&self, other: &Self) -> f64;

    /// Returns `false` for values that must never be blended (`NaN`,
    /// infinities).
    fn is_valid(&self) -> bool;
}

impl TransitionValue for f64 {
    fn lerp(&self, to: &Self, t: f64) -> Self {
        self + (to - self) * t
    }

    fn distance(&self, other: &Self) -> f64 {
        (self - other).abs()
    }

    fn is_valid(&self) -> bool {
        self.is_finite()
    }
}

impl TransitionValue for Vector3<f64> {
    fn lerp(&self, to: &Self, t: f64) -> Self {
        Self::lerp(self, to, t)
    }

    fn distance(&self, other: &Self) -> f64 {
        (self - other).norm()
    }

    fn is_valid(&self) -> bool {
        self.iter().all(|v| v.is_finite())
    }
}

impl TransitionValue for UnitQuaternion<f64> {
    /// Spherical interpolation. Exactly opposite orientations have no unique
    /// arc and switch over at the midpoint.
    fn lerp(&self, to: &Self, t: f64) -> Self {
        self.try_slerp(to, t, 1e-9)
            .unwrap_or(if t < 0.5 { *self } else { *to })
    }

    fn distance(&self, other: &Self) -> f64 {
        self.angle_to(other)
    }

    fn is_valid(&self) -> bool {
        self.coords.iter().all(|v| v.is_finite())
    }
}

impl TransitionValue for Box3 {
    /// Interpolates both corners. Transitions to or from an empty box jump.
    fn lerp(&self, to: &Self, t: f64) -> Self {
        if self.is_empty() || to.is_empty() {
            return *to;
        }
        Self::lerp(self, to, t)
    }

    fn distance(&self, other: &Self) -> f64 {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => 0.0,
            (true, false) | (false, true) => f64::INFINITY,
            (false, false) => {
                let delta = (self.min - other.min)
                    .norm()
                    .max((self.max - other.max).norm());
                let scale = self.size().norm().max(other.size().norm());
                if scale > 0.0 { delta / scale } else { delta }
            }
        }
    }

    fn is_valid(&self) -> bool {
        Self::is_valid(self)
    }
}

// ---------------------------------------------------------------------------
// Transitionable
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Segment<T> {
    target: T,
    elapsed: f64,
    duration: f64,
}

impl<T> Segment<T> {
    fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug)]
struct Inner<T> {
    current: T,
    target: T,
    /// Value the oldest live segment starts from.
    start: T,
    committed: T,
    segments: VecDeque<Segment<T>>,
    delay_time: f64,
    debounce_time: f64,
    wait_time: f64,
    config: Option<TransitionConfig>,
    active: bool,
    needs_update: bool,
}

/// A value smoothly driven from `current` toward `target`.
///
/// Values created through
/// [`System::create_transitionable`](crate::system::System::create_transitionable)
/// are updated by the system once per frame. Standalone values can be driven
/// with [`force_update`](Self::force_update).
#[derive(Debug)]
pub struct Transitionable<T: TransitionValue> {
    inner: RefCell<Inner<T>>,
}

impl<T: TransitionValue> Transitionable<T> {
    /// Creates a settled transitionable that uses the caller's default
    /// configuration.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not valid (for example, contains `NaN`).
    #[must_use]
    pub fn new(value: T) -> Self {
        assert!(value.is_valid(), "initial transition value must be finite");
        Self {
            inner: RefCell::new(Inner {
                current: value.clone(),
                target: value.clone(),
                start: value.clone(),
                committed: value,
                segments: VecDeque::new(),
                delay_time: 0.0,
                debounce_time: 0.0,
                wait_time: 0.0,
                config: None,
                active: false,
                needs_update: false,
            }),
        }
    }

    /// Creates a settled transitionable with its own configuration.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not valid.
    #[must_use]
    pub fn with_config(value: T, config: TransitionConfig) -> Self {
        let t = Self::new(value);
        t.set_config(Some(config));
        t
    }

    /// The blended value.
    #[must_use]
    pub fn current(&self) -> T {
        self.inner.borrow().current.clone()
    }

    /// The value being transitioned toward.
    #[must_use]
    pub fn target(&self) -> T {
        self.inner.borrow().target.clone()
    }

    /// Sets the value to transition toward.
    ///
    /// Invalid values are rejected and leave the transitionable unchanged.
    pub fn set_target(&self, value: T) -> Result<(), TransitionError> {
        if !value.is_valid() {
            return Err(TransitionError::NonFinite);
        }
        let mut inner = self.inner.borrow_mut();
        if value.distance(&inner.target) > 0.0 {
            inner.debounce_time = 0.0;
        }
        inner.target = value;
        Ok(())
    }

    /// Jumps both `current` and `target` to `value`, discarding any
    /// in-flight transition.
    pub fn reset(&self, value: T) -> Result<(), TransitionError> {
        if !value.is_valid() {
            return Err(TransitionError::NonFinite);
        }
        let mut inner = self.inner.borrow_mut();
        inner.current = value.clone();
        inner.start = value.clone();
        inner.committed = value.clone();
        inner.target = value;
        inner.segments.clear();
        inner.delay_time = 0.0;
        inner.debounce_time = 0.0;
        inner.wait_time = 0.0;
        Ok(())
    }

    /// The configuration override, if any.
    #[must_use]
    pub fn config(&self) -> Option<TransitionConfig> {
        self.inner.borrow().config
    }

    /// Sets or clears the configuration override.
    pub fn set_config(&self, config: Option<TransitionConfig>) {
        self.inner.borrow_mut().config = config;
    }

    /// Whether this value currently drives layout.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.borrow().active
    }

    /// Sets whether this value drives layout.
    pub fn set_active(&self, active: bool) {
        self.inner.borrow_mut().active = active;
    }

    /// Returns `true` if the next [`update`](Self::update) will do work.
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.inner.borrow().needs_update
    }

    /// Arms the next [`update`](Self::update).
    pub fn mark_needs_update(&self) {
        self.inner.borrow_mut().needs_update = true;
    }

    /// Returns `true` while a committed transition segment is in flight.
    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        !self.inner.borrow().segments.is_empty()
    }

    /// Progress of the newest transition segment in `[0, 1]`; `1` when
    /// settled.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.inner
            .borrow()
            .segments
            .back()
            .map_or(1.0, Segment::progress)
    }

    /// Advances by `delta_time` seconds if armed by
    /// [`mark_needs_update`](Self::mark_needs_update), then disarms.
    ///
    /// `defaults` applies unless a configuration override is set.
    pub fn update(&self, delta_time: f64, defaults: &TransitionConfig) {
        if !self.inner.borrow().needs_update {
            return;
        }
        self.force_update(delta_time, defaults);
    }

    /// Advances by `delta_time` seconds unconditionally.
    pub fn force_update(&self, delta_time: f64, defaults: &TransitionConfig) {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        inner.needs_update = false;
        let cfg = inner.config.unwrap_or(*defaults);
        let dt = if delta_time.is_finite() {
            delta_time.max(0.0)
        } else {
            0.0
        };

        if inner.target.distance(&inner.committed) > cfg.threshold {
            inner.delay_time += dt;
            inner.debounce_time += dt;
            if inner.delay_time >= cfg.delay && inner.debounce_time >= cfg.debounce {
                inner.commit(&cfg);
            }
        } else {
            inner.delay_time = 0.0;
        }

        inner.blend(dt, cfg.easing);

        if inner.current.distance(&inner.target) > 0.0 {
            inner.wait_time += dt;
            if inner.wait_time >= cfg.max_wait {
                inner.snap();
            }
        } else {
            inner.wait_time = 0.0;
        }
    }
}

impl<T: TransitionValue> Inner<T> {
    fn commit(&mut self, cfg: &TransitionConfig) {
        self.committed = self.target.clone();
        self.delay_time = 0.0;
        let duration = cfg.segment_duration();
        if cfg.blend && duration > 0.0 {
            self.segments.push_back(Segment {
                target: self.target.clone(),
                elapsed: 0.0,
                duration,
            });
        } else {
            self.segments.clear();
            self.start = self.target.clone();
            self.current = self.target.clone();
        }
    }

    fn blend(&mut self, dt: f64, easing: Easing) {
        if self.segments.is_empty() {
            return;
        }
        let mut value = self.start.clone();
        let mut settled = None;
        for (i, segment) in self.segments.iter_mut().enumerate() {
            segment.elapsed += dt;
            let p = segment.progress();
            if p >= 1.0 {
                value = segment.target.clone();
                settled = Some(i);
            } else {
                value = value.lerp(&segment.target, easing(p));
            }
        }
        if let Some(i) = settled {
            self.start = self.segments[i].target.clone();
            self.segments.drain(..=i);
        }
        self.current = value;
    }

    fn snap(&mut self) {
        self.current = self.target.clone();
        self.start = self.target.clone();
        self.committed = self.target.clone();
        self.segments.clear();
        self.delay_time = 0.0;
        self.wait_time = 0.0;
    }
}

/// Type-erased access used by the system's per-frame update.
pub(crate) trait AnyTransitionable {
    fn arm(&self);
    fn step(&self, delta_time: f64, defaults: &TransitionConfig);
}

impl<T: TransitionValue> AnyTransitionable for Transitionable<T> {
    fn arm(&self) {
        self.mark_needs_update();
    }

    fn step(&self, delta_time: f64, defaults: &TransitionConfig) {
        self.update(delta_time, defaults);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(duration: f64) -> TransitionConfig {
        TransitionConfig {
            duration,
            ..TransitionConfig::default()
        }
    }

    fn run(t: &Transitionable<f64>, steps: usize, dt: f64) {
        let defaults = TransitionConfig::default();
        for _ in 0..steps {
            t.mark_needs_update();
            t.update(dt, &defaults);
        }
    }

    #[test]
    fn scalar_settles_within_duration() {
        let t = Transitionable::with_config(0.0, timed(1.0));
        t.set_target(1.0).unwrap();
        run(&t, 10, 0.1);
        let threshold = TransitionConfig::default().threshold;
        assert!(
            (t.current() - 1.0).abs() <= threshold,
            "current {} should be within {threshold} of 1",
            t.current()
        );
    }

    #[test]
    fn midway_value_is_strictly_between() {
        let t = Transitionable::with_config(0.0, timed(1.0));
        t.set_target(1.0).unwrap();
        run(&t, 5, 0.1);
        let c = t.current();
        assert!(c > 0.0 && c < 1.0, "blending, got {c}");
        assert!(t.is_transitioning(), "segment in flight");
        assert!((t.progress() - 0.5).abs() < 1e-9, "half way");
    }

    #[test]
    fn completed_segment_lands_exactly() {
        let t = Transitionable::with_config(0.0, timed(0.5));
        t.set_target(3.0).unwrap();
        run(&t, 3, 0.25);
        assert_eq!(t.current(), 3.0, "exact after the segment completes");
        assert!(!t.is_transitioning(), "settled");
        assert_eq!(t.progress(), 1.0, "settled progress");
    }

    #[test]
    fn max_wait_snaps_exactly() {
        let config = TransitionConfig {
            duration: 100.0,
            max_wait: 1.0,
            ..TransitionConfig::default()
        };
        let t = Transitionable::with_config(0.0, config);
        t.set_target(7.0).unwrap();
        run(&t, 3, 0.25);
        assert_ne!(t.current(), 7.0, "still blending before max_wait");
        run(&t, 1, 0.25);
        assert_eq!(t.current(), 7.0, "snapped at max_wait");
        assert!(!t.is_transitioning(), "queue cleared");
    }

    #[test]
    fn max_wait_covers_sub_threshold_targets() {
        let config = TransitionConfig {
            max_wait: 0.5,
            ..TransitionConfig::default()
        };
        let t = Transitionable::with_config(0.0, config);
        t.set_target(0.00005).unwrap();
        run(&t, 1, 0.25);
        assert_eq!(t.current(), 0.0, "below threshold: no commit");
        run(&t, 1, 0.25);
        assert_eq!(t.current(), 0.00005, "snapped by max_wait");
    }

    #[test]
    fn unblended_values_jump() {
        let config = TransitionConfig {
            duration: 1.0,
            blend: false,
            ..TransitionConfig::default()
        };
        let t = Transitionable::with_config(0.0, config);
        t.set_target(2.0).unwrap();
        run(&t, 1, 0.01);
        assert_eq!(t.current(), 2.0, "assigned directly");
    }

    #[test]
    fn delay_and_debounce_postpone_commit() {
        let config = TransitionConfig {
            delay: 0.3,
            debounce: 0.2,
            blend: false,
            ..TransitionConfig::default()
        };
        let t = Transitionable::with_config(0.0, config);
        t.set_target(1.0).unwrap();
        run(&t, 2, 0.1);
        assert_eq!(t.current(), 0.0, "delay not yet elapsed");
        t.set_target(2.0).unwrap();
        run(&t, 1, 0.1);
        assert_eq!(t.current(), 0.0, "debounce restarted by the new target");
        run(&t, 1, 0.1);
        assert_eq!(t.current(), 2.0, "committed once stable");
    }

    #[test]
    fn update_without_arming_does_nothing() {
        let t = Transitionable::new(0.0);
        t.set_target(5.0).unwrap();
        t.update(1.0, &TransitionConfig::default());
        assert_eq!(t.current(), 0.0, "not armed");
        t.mark_needs_update();
        assert!(t.needs_update(), "armed");
        t.update(1.0, &TransitionConfig::default());
        assert_eq!(t.current(), 5.0, "zero duration commits immediately");
        assert!(!t.needs_update(), "disarmed");
    }

    #[test]
    fn non_finite_targets_are_rejected() {
        let t = Transitionable::new(1.0);
        assert_eq!(t.set_target(f64::NAN), Err(TransitionError::NonFinite), "NaN");
        assert_eq!(
            t.set_target(f64::INFINITY),
            Err(TransitionError::NonFinite),
            "infinity"
        );
        assert_eq!(t.target(), 1.0, "target unchanged");

        let q = Transitionable::new(UnitQuaternion::<f64>::identity());
        let bad = UnitQuaternion::new_unchecked(nalgebra::Quaternion::new(f64::NAN, 0.0, 0.0, 0.0));
        assert!(q.set_target(bad).is_err(), "NaN quaternion");
    }

    #[test]
    #[should_panic(expected = "initial transition value must be finite")]
    fn non_finite_initial_value_panics() {
        let _ = Transitionable::new(f64::NAN);
    }

    #[test]
    fn orientation_slerps() {
        let target = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1.0);
        let t = Transitionable::with_config(UnitQuaternion::identity(), timed(1.0));
        t.set_target(target).unwrap();
        let defaults = TransitionConfig::default();
        t.force_update(0.5, &defaults);
        let angle = t.current().angle();
        assert!(angle > 0.0 && angle < 1.0, "part way, got {angle}");
        t.force_update(0.5, &defaults);
        assert!(t.current().angle_to(&target) < 1e-12, "arrived");
    }

    #[test]
    fn box_from_empty_jumps() {
        let b = Box3::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let t = Transitionable::with_config(Box3::EMPTY, timed(1.0));
        t.set_target(b).unwrap();
        t.force_update(0.1, &TransitionConfig::default());
        assert_eq!(t.current(), b, "no interpolation out of an empty box");
    }
}
