// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Per-layout scores ([`on_layout_scores`](TraceSink::on_layout_scores))
//! store only the count and how many were feasible.

use orogeny_core::adapter::AdapterStatus;
use orogeny_core::trace::{
    FrameBeginEvent, FrameSummary, LayoutActivatedEvent, LayoutScore, PhaseBeginEvent,
    PhaseEndEvent, PhaseKind, StatusChangeEvent, SwarmRestartEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_BEGIN: u8 = 1;
const TAG_PHASE_BEGIN: u8 = 2;
const TAG_PHASE_END: u8 = 3;
const TAG_LAYOUT_ACTIVATED: u8 = 4;
const TAG_STATUS_CHANGE: u8 = 5;
const TAG_SWARM_RESTART: u8 = 6;
const TAG_FRAME_SUMMARY: u8 = 7;
const TAG_LAYOUT_SCORES_COUNT: u8 = 8;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_option_u32(&mut self, v: Option<u32>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_u32(val);
            }
            None => {
                self.write_u8(0);
                self.write_u32(0);
            }
        }
    }

    fn write_option_f64(&mut self, v: Option<f64>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_f64(val);
            }
            None => {
                self.write_u8(0);
                self.write_u64(0);
            }
        }
    }

    fn write_phase(&mut self, p: PhaseKind) {
        self.write_u8(match p {
            PhaseKind::Invalidate => 0,
            PhaseKind::Transition => 1,
            PhaseKind::ResolveView => 2,
            PhaseKind::Optimize => 3,
        });
    }

    fn write_status(&mut self, s: AdapterStatus) {
        self.write_u8(match s {
            AdapterStatus::Stable => 0,
            AdapterStatus::Transitioning => 1,
            AdapterStatus::TransitionBegin => 2,
        });
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "counts capped at u32::MAX for recording"
    )]
    fn write_count(&mut self, count: usize) {
        self.write_u32(count.min(u32::MAX as usize) as u32);
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_begin(&mut self, e: &FrameBeginEvent) {
        self.write_u8(TAG_FRAME_BEGIN);
        self.write_u64(e.frame_index);
        self.write_f64(e.time);
        self.write_f64(e.delta_time);
        self.write_u64(e.timestamp);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_u8(TAG_PHASE_BEGIN);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_u8(TAG_PHASE_END);
        self.write_u64(e.frame_index);
        self.write_phase(e.phase);
        self.write_u64(e.timestamp);
    }

    fn on_layout_activated(&mut self, e: &LayoutActivatedEvent) {
        self.write_u8(TAG_LAYOUT_ACTIVATED);
        self.write_u64(e.frame_index);
        self.write_u32(e.node_index);
        self.write_option_u32(e.layout);
        self.write_option_u32(e.previous);
        self.write_option_f64(e.score);
    }

    fn on_status_change(&mut self, e: &StatusChangeEvent) {
        self.write_u8(TAG_STATUS_CHANGE);
        self.write_u64(e.frame_index);
        self.write_u32(e.node_index);
        self.write_status(e.status);
        self.write_status(e.previous);
    }

    fn on_swarm_restart(&mut self, e: &SwarmRestartEvent) {
        self.write_u8(TAG_SWARM_RESTART);
        self.write_u64(e.frame_index);
        self.write_u32(e.node_index);
        self.write_u32(e.layout);
        self.write_u64(e.restarts);
        self.write_f64(e.success_rate);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.write_u8(TAG_FRAME_SUMMARY);
        self.write_u64(s.frame_index);
        self.write_f64(s.time);
        self.write_f64(s.delta_time);
        self.write_u32(s.transitionables);
        self.write_u32(s.adapters);
        self.write_u32(s.active_layouts);
        self.write_u32(s.transitioning);
        self.write_u64(s.invalidate_nanos);
        self.write_u64(s.transition_nanos);
        self.write_u64(s.resolve_view_nanos);
        self.write_u64(s.optimize_nanos);
    }

    fn on_layout_scores(&mut self, frame_index: u64, scores: &[LayoutScore]) {
        self.write_u8(TAG_LAYOUT_SCORES_COUNT);
        self.write_u64(frame_index);
        self.write_count(scores.len());
        self.write_count(scores.iter().filter(|s| s.score.is_some()).count());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`FrameBeginEvent`].
    FrameBegin(FrameBeginEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`LayoutActivatedEvent`].
    LayoutActivated(LayoutActivatedEvent),
    /// A [`StatusChangeEvent`].
    StatusChange(StatusChangeEvent),
    /// A [`SwarmRestartEvent`].
    SwarmRestart(SwarmRestartEvent),
    /// A [`FrameSummary`].
    FrameSummary(FrameSummary),
    /// Layout-score counts for a frame.
    LayoutScoresCount {
        /// Update counter.
        frame_index: u64,
        /// Number of scored layouts.
        count: u32,
        /// How many of them had a feasible best.
        feasible: u32,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    fn read_option_u32(&mut self) -> Option<Option<u32>> {
        let present = self.read_u8()?;
        let val = self.read_u32()?;
        Some((present != 0).then_some(val))
    }

    fn read_option_f64(&mut self) -> Option<Option<f64>> {
        let present = self.read_u8()?;
        let val = self.read_f64()?;
        Some((present != 0).then_some(val))
    }

    fn read_phase(&mut self) -> Option<PhaseKind> {
        Some(match self.read_u8()? {
            0 => PhaseKind::Invalidate,
            1 => PhaseKind::Transition,
            2 => PhaseKind::ResolveView,
            _ => PhaseKind::Optimize,
        })
    }

    fn read_status(&mut self) -> Option<AdapterStatus> {
        Some(match self.read_u8()? {
            0 => AdapterStatus::Stable,
            1 => AdapterStatus::Transitioning,
            _ => AdapterStatus::TransitionBegin,
        })
    }

    fn decode_frame_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameBegin(FrameBeginEvent {
            frame_index: self.read_u64()?,
            time: self.read_f64()?,
            delta_time: self.read_f64()?,
            timestamp: self.read_u64()?,
        }))
    }

    fn decode_phase_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_u64()?,
        }))
    }

    fn decode_phase_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
            frame_index: self.read_u64()?,
            phase: self.read_phase()?,
            timestamp: self.read_u64()?,
        }))
    }

    fn decode_layout_activated(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LayoutActivated(LayoutActivatedEvent {
            frame_index: self.read_u64()?,
            node_index: self.read_u32()?,
            layout: self.read_option_u32()?,
            previous: self.read_option_u32()?,
            score: self.read_option_f64()?,
        }))
    }

    fn decode_status_change(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::StatusChange(StatusChangeEvent {
            frame_index: self.read_u64()?,
            node_index: self.read_u32()?,
            status: self.read_status()?,
            previous: self.read_status()?,
        }))
    }

    fn decode_swarm_restart(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SwarmRestart(SwarmRestartEvent {
            frame_index: self.read_u64()?,
            node_index: self.read_u32()?,
            layout: self.read_u32()?,
            restarts: self.read_u64()?,
            success_rate: self.read_f64()?,
        }))
    }

    fn decode_frame_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSummary(FrameSummary {
            frame_index: self.read_u64()?,
            time: self.read_f64()?,
            delta_time: self.read_f64()?,
            transitionables: self.read_u32()?,
            adapters: self.read_u32()?,
            active_layouts: self.read_u32()?,
            transitioning: self.read_u32()?,
            invalidate_nanos: self.read_u64()?,
            transition_nanos: self.read_u64()?,
            resolve_view_nanos: self.read_u64()?,
            optimize_nanos: self.read_u64()?,
        }))
    }

    fn decode_layout_scores_count(&mut self) -> Option<RecordedEvent> {
        let frame_index = self.read_u64()?;
        let count = self.read_u32()?;
        let feasible = self.read_u32()?;
        Some(RecordedEvent::LayoutScoresCount {
            frame_index,
            count,
            feasible,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_FRAME_BEGIN => self.decode_frame_begin(),
            TAG_PHASE_BEGIN => self.decode_phase_begin(),
            TAG_PHASE_END => self.decode_phase_end(),
            TAG_LAYOUT_ACTIVATED => self.decode_layout_activated(),
            TAG_STATUS_CHANGE => self.decode_status_change(),
            TAG_SWARM_RESTART => self.decode_swarm_restart(),
            TAG_FRAME_SUMMARY => self.decode_frame_summary(),
            TAG_LAYOUT_SCORES_COUNT => self.decode_layout_scores_count(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_summary() -> FrameSummary {
        FrameSummary {
            frame_index: 7,
            time: 1.25,
            delta_time: 0.016,
            transitionables: 12,
            adapters: 4,
            active_layouts: 3,
            transitioning: 1,
            invalidate_nanos: 100,
            transition_nanos: 400,
            resolve_view_nanos: 1500,
            optimize_nanos: 50_000,
        }
    }

    #[test]
    fn frame_summary_survives_recording() {
        let mut rec = RecorderSink::new();
        let orig = sample_summary();
        rec.on_frame_summary(&orig);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 1, "one event");
        match &events[0] {
            RecordedEvent::FrameSummary(s) => assert_eq!(*s, orig, "fields preserved"),
            other => panic!("expected FrameSummary, got {other:?}"),
        }
    }

    #[test]
    fn layout_activation_keeps_missing_values() {
        let mut rec = RecorderSink::new();
        let orig = LayoutActivatedEvent {
            frame_index: 3,
            node_index: 9,
            layout: None,
            previous: Some(2),
            score: None,
        };
        rec.on_layout_activated(&orig);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        match &events[..] {
            [RecordedEvent::LayoutActivated(e)] => assert_eq!(*e, orig, "fields preserved"),
            other => panic!("expected one LayoutActivated, got {other:?}"),
        }
    }

    #[test]
    fn mixed_events_decode_in_order() {
        let mut rec = RecorderSink::new();
        rec.on_frame_begin(&FrameBeginEvent {
            frame_index: 7,
            time: 1.25,
            delta_time: 0.016,
            timestamp: 900,
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 7,
            phase: PhaseKind::Optimize,
            timestamp: 1000,
        });
        rec.on_status_change(&StatusChangeEvent {
            frame_index: 7,
            node_index: 1,
            status: AdapterStatus::Transitioning,
            previous: AdapterStatus::TransitionBegin,
        });
        rec.on_swarm_restart(&SwarmRestartEvent {
            frame_index: 7,
            node_index: 1,
            layout: 0,
            restarts: 2,
            success_rate: 0.2,
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 7,
            phase: PhaseKind::Optimize,
            timestamp: 2000,
        });
        rec.on_frame_summary(&sample_summary());

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 6, "all events decoded");
        assert!(matches!(events[0], RecordedEvent::FrameBegin(_)), "frame begin");
        assert!(
            matches!(events[1], RecordedEvent::PhaseBegin(e) if e.phase == PhaseKind::Optimize),
            "phase begin"
        );
        match &events[2] {
            RecordedEvent::StatusChange(e) => {
                assert_eq!(e.status, AdapterStatus::Transitioning, "status");
                assert_eq!(e.previous, AdapterStatus::TransitionBegin, "previous");
            }
            other => panic!("expected StatusChange, got {other:?}"),
        }
        match &events[3] {
            RecordedEvent::SwarmRestart(e) => {
                assert_eq!(e.restarts, 2, "restarts");
                assert_eq!(e.success_rate, 0.2, "success rate");
            }
            other => panic!("expected SwarmRestart, got {other:?}"),
        }
        assert!(matches!(events[4], RecordedEvent::PhaseEnd(_)), "phase end");
        assert!(matches!(events[5], RecordedEvent::FrameSummary(_)), "summary");
    }

    #[test]
    fn layout_scores_record_counts() {
        let mut rec = RecorderSink::new();
        let score = |layout, score| LayoutScore {
            node_index: 0,
            layout,
            score,
            step_size: 0.3,
            success_rate: 0.2,
        };
        rec.on_layout_scores(42, &[score(0, Some(1.0)), score(1, None), score(2, Some(0.5))]);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        match &events[..] {
            [
                RecordedEvent::LayoutScoresCount {
                    frame_index,
                    count,
                    feasible,
                },
            ] => {
                assert_eq!(*frame_index, 42, "frame index");
                assert_eq!(*count, 3, "all layouts");
                assert_eq!(*feasible, 2, "feasible layouts");
            }
            other => panic!("expected one LayoutScoresCount, got {other:?}"),
        }
    }

    #[test]
    fn truncated_record_stops_decoding() {
        let mut rec = RecorderSink::new();
        rec.on_frame_summary(&sample_summary());
        let bytes = rec.into_bytes();
        let events: Vec<_> = decode(&bytes[..bytes.len() - 1]).collect();
        assert!(events.is_empty(), "partial record is dropped");
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty(), "no events");
    }
}
