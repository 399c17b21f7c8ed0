// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! and phase durations are printed in microseconds.

use std::io::Write;

use orogeny_core::trace::{
    FrameBeginEvent, FrameSummary, LayoutActivatedEvent, LayoutScore, PhaseBeginEvent,
    PhaseEndEvent, PhaseKind, StatusChangeEvent, SwarmRestartEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Invalidate => "invalidate",
        PhaseKind::Transition => "transition",
        PhaseKind::ResolveView => "view",
        PhaseKind::Optimize => "optimize",
    }
}

fn layout_name(layout: Option<u32>) -> String {
    layout.map_or_else(|| "none".to_owned(), |id| format!("#{id}"))
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[frame] frame={} time={:.3}s dt={:.1}ms at {:.1}µs",
            e.frame_index,
            e.time,
            e.delta_time * 1000.0,
            nanos_to_us(e.timestamp),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            nanos_to_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] frame={} {} at {:.1}µs",
            e.frame_index,
            phase_name(e.phase),
            nanos_to_us(e.timestamp),
        );
    }

    fn on_layout_activated(&mut self, e: &LayoutActivatedEvent) {
        let score = e
            .score
            .map_or_else(|| "-".to_owned(), |s| format!("{s:.4}"));
        let _ = writeln!(
            self.writer,
            "[layout] frame={} node={} {} -> {} score={score}",
            e.frame_index,
            e.node_index,
            layout_name(e.previous),
            layout_name(e.layout),
        );
    }

    fn on_status_change(&mut self, e: &StatusChangeEvent) {
        let _ = writeln!(
            self.writer,
            "[status] frame={} node={} {:?} -> {:?}",
            e.frame_index, e.node_index, e.previous, e.status,
        );
    }

    fn on_swarm_restart(&mut self, e: &SwarmRestartEvent) {
        let _ = writeln!(
            self.writer,
            "[restart] frame={} node={} layout=#{} restarts={} success={:.3}",
            e.frame_index, e.node_index, e.layout, e.restarts, e.success_rate,
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] frame={} adapters={} active={} moving={} transitionables={} \
             invalidate={:.1}µs transition={:.1}µs view={:.1}µs optimize={:.1}µs",
            s.frame_index,
            s.adapters,
            s.active_layouts,
            s.transitioning,
            s.transitionables,
            nanos_to_us(s.invalidate_nanos),
            nanos_to_us(s.transition_nanos),
            nanos_to_us(s.resolve_view_nanos),
            nanos_to_us(s.optimize_nanos),
        );
    }

    fn on_layout_scores(&mut self, frame_index: u64, scores: &[LayoutScore]) {
        let feasible = scores.iter().filter(|s| s.score.is_some()).count();
        let _ = writeln!(
            self.writer,
            "[scores] frame={frame_index} layouts={} feasible={feasible}",
            scores.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orogeny_core::adapter::AdapterStatus;

    #[test]
    fn pretty_print_frame_begin() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_frame_begin(&FrameBeginEvent {
            frame_index: 1,
            time: 0.5,
            delta_time: 0.016,
            timestamp: 1_000_000,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("[frame]"), "got: {output}");
        assert!(output.contains("frame=1"), "got: {output}");
        assert!(output.contains("1000.0µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_layout_and_status() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_layout_activated(&LayoutActivatedEvent {
            frame_index: 3,
            node_index: 2,
            layout: Some(1),
            previous: None,
            score: Some(-0.5),
        });
        sink.on_status_change(&StatusChangeEvent {
            frame_index: 3,
            node_index: 2,
            status: AdapterStatus::TransitionBegin,
            previous: AdapterStatus::Stable,
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains("none -> #1"), "got: {output}");
        assert!(output.contains("score=-0.5000"), "got: {output}");
        assert!(output.contains("Stable -> TransitionBegin"), "got: {output}");
    }
}
