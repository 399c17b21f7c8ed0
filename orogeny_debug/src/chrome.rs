// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//! Adapter events are placed on one track per node (`tid` is the node's
//! registration index plus one); update phases live on track `0`.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Events without their own timestamp are stamped with the most recent
/// phase or frame timestamp seen before them.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut last_us = 0.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::FrameBegin(e) => {
                last_us = nanos_to_us(e.timestamp);
                events.push(json!({
                    "ph": "i",
                    "name": "FrameBegin",
                    "cat": "System",
                    "ts": last_us,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                        "time": e.time,
                        "delta_time": e.delta_time,
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                last_us = nanos_to_us(e.timestamp);
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": last_us,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                last_us = nanos_to_us(e.timestamp);
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Frame",
                    "ts": last_us,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::LayoutActivated(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "LayoutActivated",
                    "cat": "Adapter",
                    "ts": last_us,
                    "pid": 0,
                    "tid": u64::from(e.node_index) + 1,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "layout": e.layout,
                        "previous": e.previous,
                        "score": e.score,
                    }
                }));
            }
            RecordedEvent::StatusChange(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("{:?}", e.status),
                    "cat": "Adapter",
                    "ts": last_us,
                    "pid": 0,
                    "tid": u64::from(e.node_index) + 1,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "previous": format!("{:?}", e.previous),
                    }
                }));
            }
            RecordedEvent::SwarmRestart(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "SwarmRestart",
                    "cat": "Optimizer",
                    "ts": last_us,
                    "pid": 0,
                    "tid": u64::from(e.node_index) + 1,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "layout": e.layout,
                        "restarts": e.restarts,
                        "success_rate": e.success_rate,
                    }
                }));
            }
            RecordedEvent::FrameSummary(s) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Adapters",
                    "cat": "Summary",
                    "ts": last_us,
                    "pid": 0,
                    "args": {
                        "active": s.active_layouts,
                        "transitioning": s.transitioning,
                    }
                }));
                events.push(json!({
                    "ph": "i",
                    "name": "FrameSummary",
                    "cat": "Summary",
                    "ts": last_us,
                    "pid": 0,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": s.frame_index,
                        "adapters": s.adapters,
                        "transitionables": s.transitionables,
                        "invalidate_us": nanos_to_us(s.invalidate_nanos),
                        "transition_us": nanos_to_us(s.transition_nanos),
                        "resolve_view_us": nanos_to_us(s.resolve_view_nanos),
                        "optimize_us": nanos_to_us(s.optimize_nanos),
                    }
                }));
            }
            RecordedEvent::LayoutScoresCount {
                frame_index,
                count,
                feasible,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "LayoutScores",
                    "cat": "Rich",
                    "ts": last_us,
                    "pid": 0,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "frame_index": frame_index,
                        "count": count,
                        "feasible": feasible,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use orogeny_core::adapter::AdapterStatus;
    use orogeny_core::trace::{
        FrameBeginEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, StatusChangeEvent, TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_frame_begin(&FrameBeginEvent {
            frame_index: 0,
            time: 0.016,
            delta_time: 0.016,
            timestamp: 1_000_000,
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            frame_index: 0,
            phase: PhaseKind::Optimize,
            timestamp: 1_000_000,
        });
        rec.on_status_change(&StatusChangeEvent {
            frame_index: 0,
            node_index: 4,
            status: AdapterStatus::TransitionBegin,
            previous: AdapterStatus::Stable,
        });
        rec.on_phase_end(&PhaseEndEvent {
            frame_index: 0,
            phase: PhaseKind::Optimize,
            timestamp: 1_000_100,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 4, "one object per event");

        assert_eq!(parsed[0]["ph"], "i", "frame begin is an instant");
        assert_eq!(parsed[0]["name"], "FrameBegin", "frame begin name");

        assert_eq!(parsed[1]["ph"], "B", "phase begin");
        assert_eq!(parsed[1]["name"], "Optimize", "phase name");

        assert_eq!(parsed[2]["name"], "TransitionBegin", "status name");
        assert_eq!(parsed[2]["tid"], 5, "per-node track");
        assert_eq!(parsed[2]["ts"], 1000.0, "stamped with the phase start");

        assert_eq!(parsed[3]["ph"], "E", "phase end");
        assert_eq!(parsed[3]["name"], "Optimize", "phase name");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty(), "no events");
    }
}
