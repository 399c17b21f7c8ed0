// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the system update.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that
//! [`System::update_traced`](crate::system::System::update_traced) calls at
//! each stage. All method bodies default to no-ops, so implementing only the
//! events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] collects phase timestamps during an update and
//! produces a [`FrameSummary`] at the end.
//!
//! Timestamps are nanoseconds since the system was created.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) gates per-layout [`LayoutScore`] records
//!   and the corresponding `TraceSink` method.

use crate::adapter::AdapterStatus;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which phase of the system update is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// Marking metrics and adapter transitionables dirty.
    Invalidate,
    /// Stepping every registered transitionable.
    Transition,
    /// Resolving the view node's metrics.
    ResolveView,
    /// Updating adapters: optimizer iterations and retargeting.
    Optimize,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted at the start of every update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameBeginEvent {
    /// Monotonic update counter.
    pub frame_index: u64,
    /// Host time passed to the update, in seconds.
    pub time: f64,
    /// Clamped delta time, in seconds.
    pub delta_time: f64,
    /// Nanoseconds since system creation.
    pub timestamp: u64,
}

/// Marks the beginning of an update phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseBeginEvent {
    /// Update counter.
    pub frame_index: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Nanoseconds since system creation.
    pub timestamp: u64,
}

/// Marks the end of an update phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseEndEvent {
    /// Update counter.
    pub frame_index: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Nanoseconds since system creation.
    pub timestamp: u64,
}

/// Emitted when an adapter's active layout changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutActivatedEvent {
    /// Update counter.
    pub frame_index: u64,
    /// Registration index of the node's metrics.
    pub node_index: u32,
    /// Newly active layout id, if any.
    pub layout: Option<u32>,
    /// Previously active layout id, if any.
    pub previous: Option<u32>,
    /// Best score of the newly active layout.
    pub score: Option<f64>,
}

/// Emitted when an adapter's status changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChangeEvent {
    /// Update counter.
    pub frame_index: u64,
    /// Registration index of the node's metrics.
    pub node_index: u32,
    /// New status.
    pub status: AdapterStatus,
    /// Status before this update.
    pub previous: AdapterStatus,
}

/// Emitted when a layout's swarm went stale and was partially restarted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwarmRestartEvent {
    /// Update counter.
    pub frame_index: u64,
    /// Registration index of the node's metrics.
    pub node_index: u32,
    /// Layout id.
    pub layout: u32,
    /// Total restarts of this layout so far.
    pub restarts: u64,
    /// Success rate after the restart.
    pub success_rate: f64,
}

/// Per-update summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSummary {
    /// Update counter.
    pub frame_index: u64,
    /// Host time passed to the update, in seconds.
    pub time: f64,
    /// Clamped delta time, in seconds.
    pub delta_time: f64,
    /// Live registered transitionables.
    pub transitionables: u32,
    /// Adapters in the system.
    pub adapters: u32,
    /// Adapters with an active layout.
    pub active_layouts: u32,
    /// Adapters not [`Stable`](AdapterStatus::Stable).
    pub transitioning: u32,
    /// Invalidate phase duration in nanoseconds (0 if not measured).
    pub invalidate_nanos: u64,
    /// Transition phase duration in nanoseconds (0 if not measured).
    pub transition_nanos: u64,
    /// View resolution phase duration in nanoseconds (0 if not measured).
    pub resolve_view_nanos: u64,
    /// Optimize phase duration in nanoseconds (0 if not measured).
    pub optimize_nanos: u64,
}

/// A per-layout optimizer snapshot.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutScore {
    /// Registration index of the node's metrics.
    pub node_index: u32,
    /// Layout id.
    pub layout: u32,
    /// Best score, if the layout has a feasible best.
    pub score: Option<f64>,
    /// Current step size.
    pub step_size: f64,
    /// Current success rate.
    pub success_rate: f64,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the system update.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called at the start of an update.
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        _ = e;
    }

    /// Called at the beginning of an update phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of an update phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called when an adapter switches layouts.
    fn on_layout_activated(&mut self, e: &LayoutActivatedEvent) {
        _ = e;
    }

    /// Called when an adapter's status changes.
    fn on_status_change(&mut self, e: &StatusChangeEvent) {
        _ = e;
    }

    /// Called when a stale swarm restarts.
    fn on_swarm_restart(&mut self, e: &SwarmRestartEvent) {
        _ = e;
    }

    /// Called with a per-update summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }

    /// Called with every presentable layout's optimizer state (requires
    /// `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_layout_scores(&mut self, frame_index: u64, scores: &[LayoutScore]) {
        _ = (frame_index, scores);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` before dispatching.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Returns `true` if events reach a sink. Always `false` without the
    /// `trace` feature.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Emits a [`FrameBeginEvent`].
    #[inline]
    pub fn frame_begin(&mut self, e: &FrameBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`LayoutActivatedEvent`].
    #[inline]
    pub fn layout_activated(&mut self, e: &LayoutActivatedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_layout_activated(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`StatusChangeEvent`].
    #[inline]
    pub fn status_change(&mut self, e: &StatusChangeEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_status_change(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`SwarmRestartEvent`].
    #[inline]
    pub fn swarm_restart(&mut self, e: &SwarmRestartEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_swarm_restart(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_frame_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }

    /// Emits layout scores (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn layout_scores(&mut self, frame_index: u64, scores: &[LayoutScore]) {
        if let Some(s) = &mut self.sink {
            s.on_layout_scores(frame_index, scores);
        }
    }
}

// ---------------------------------------------------------------------------
// FrameSummaryBuilder
// ---------------------------------------------------------------------------

/// Collects phase timestamps during an update and produces a
/// [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    begin: FrameBeginEvent,
    phase_starts: [Option<u64>; 4],
    phase_ends: [Option<u64>; 4],
    transitionables: u32,
    adapters: u32,
    active_layouts: u32,
    transitioning: u32,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given update.
    #[must_use]
    pub fn new(begin: &FrameBeginEvent) -> Self {
        Self {
            begin: *begin,
            phase_starts: [None; 4],
            phase_ends: [None; 4],
            transitionables: 0,
            adapters: 0,
            active_layouts: 0,
            transitioning: 0,
        }
    }

    /// Records the start of a phase.
    pub fn phase_begin(&mut self, phase: PhaseKind, t: u64) {
        self.phase_starts[phase_index(phase)] = Some(t);
    }

    /// Records the end of a phase.
    pub fn phase_end(&mut self, phase: PhaseKind, t: u64) {
        self.phase_ends[phase_index(phase)] = Some(t);
    }

    /// Records the number of live transitionables.
    pub fn set_transitionables(&mut self, count: u32) {
        self.transitionables = count;
    }

    /// Records adapter totals.
    pub fn set_adapters(&mut self, adapters: u32, active_layouts: u32, transitioning: u32) {
        self.adapters = adapters;
        self.active_layouts = active_layouts;
        self.transitioning = transitioning;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self) -> FrameSummary {
        FrameSummary {
            frame_index: self.begin.frame_index,
            time: self.begin.time,
            delta_time: self.begin.delta_time,
            transitionables: self.transitionables,
            adapters: self.adapters,
            active_layouts: self.active_layouts,
            transitioning: self.transitioning,
            invalidate_nanos: self.phase_duration(PhaseKind::Invalidate),
            transition_nanos: self.phase_duration(PhaseKind::Transition),
            resolve_view_nanos: self.phase_duration(PhaseKind::ResolveView),
            optimize_nanos: self.phase_duration(PhaseKind::Optimize),
        }
    }

    fn phase_duration(&self, phase: PhaseKind) -> u64 {
        let idx = phase_index(phase);
        match (self.phase_starts[idx], self.phase_ends[idx]) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }
}

/// Maps a [`PhaseKind`] to an array index.
const fn phase_index(phase: PhaseKind) -> usize {
    match phase {
        PhaseKind::Invalidate => 0,
        PhaseKind::Transition => 1,
        PhaseKind::ResolveView => 2,
        PhaseKind::Optimize => 3,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_begin() -> FrameBeginEvent {
        FrameBeginEvent {
            frame_index: 42,
            time: 1.5,
            delta_time: 0.016,
            timestamp: 1_000_000,
        }
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        sink.on_frame_begin(&sample_begin());
        sink.on_status_change(&StatusChangeEvent {
            frame_index: 0,
            node_index: 1,
            status: AdapterStatus::TransitionBegin,
            previous: AdapterStatus::Stable,
        });
        sink.on_frame_summary(&FrameSummaryBuilder::new(&sample_begin()).finish());
    }

    #[test]
    fn tracer_none_does_nothing() {
        let mut tracer = Tracer::none();
        assert!(!tracer.is_enabled(), "no sink attached");
        tracer.frame_begin(&sample_begin());
        tracer.phase_begin(&PhaseBeginEvent {
            frame_index: 42,
            phase: PhaseKind::Invalidate,
            timestamp: 0,
        });
    }

    #[test]
    fn summary_builder_computes_durations() {
        let mut builder = FrameSummaryBuilder::new(&sample_begin());
        builder.phase_begin(PhaseKind::Invalidate, 1_000_000);
        builder.phase_end(PhaseKind::Invalidate, 1_000_100);
        builder.phase_begin(PhaseKind::Transition, 1_000_100);
        builder.phase_end(PhaseKind::Transition, 1_000_500);
        builder.phase_begin(PhaseKind::ResolveView, 1_000_500);
        builder.phase_end(PhaseKind::ResolveView, 1_002_000);
        builder.phase_begin(PhaseKind::Optimize, 1_002_000);
        builder.phase_end(PhaseKind::Optimize, 1_002_050);
        builder.set_transitionables(9);
        builder.set_adapters(3, 2, 1);

        let summary = builder.finish();
        assert_eq!(summary.invalidate_nanos, 100, "invalidate");
        assert_eq!(summary.transition_nanos, 400, "transition");
        assert_eq!(summary.resolve_view_nanos, 1500, "resolve view");
        assert_eq!(summary.optimize_nanos, 50, "optimize");
        assert_eq!(summary.frame_index, 42, "frame index");
        assert_eq!(summary.transitionables, 9, "transitionables");
        assert_eq!(
            (summary.adapters, summary.active_layouts, summary.transitioning),
            (3, 2, 1),
            "adapter totals"
        );
    }

    #[test]
    fn summary_builder_missing_phases_are_zero() {
        let summary = FrameSummaryBuilder::new(&sample_begin()).finish();
        assert_eq!(summary.invalidate_nanos, 0, "invalidate");
        assert_eq!(summary.transition_nanos, 0, "transition");
        assert_eq!(summary.resolve_view_nanos, 0, "resolve view");
        assert_eq!(summary.optimize_nanos, 0, "optimize");
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_sink() {
        struct RecordingSink {
            frames: Vec<u64>,
        }
        impl TraceSink for RecordingSink {
            fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
                self.frames.push(e.frame_index);
            }
        }

        let mut sink = RecordingSink { frames: Vec::new() };
        let mut tracer = Tracer::new(&mut sink);
        assert!(tracer.is_enabled(), "sink attached");
        tracer.frame_begin(&sample_begin());
        drop(tracer);
        assert_eq!(sink.frames, &[42], "one frame recorded");
    }
}
