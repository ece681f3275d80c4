//! replay.rs — drive the simulator over stored history and emit frames
//!
//! Two modes, both strictly sequential over the time-ordered action log:
//! time-stepped (one frame per fixed step, the timelapse default) and
//! per-action (one frame per visible change, for dense periods). Frames go
//! to a [`FrameSink`] — the shipped sink writes one JSON line per frame to a
//! byte pipe; the external renderer/encoder owns everything from there on.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use intel_types::{ActionRecord, PortalRecord, WorldSnapshot};
use world_sim::WorldModel;

// ── Renderer contract ─────────────────────────────────────────────────────────

/// Receives one snapshot per frame together with its display timestamp.
/// Rendering technology, resolution, and styling live behind this seam.
pub trait FrameSink {
    fn emit(&mut self, display_ms: i64, snapshot: &WorldSnapshot) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameLine<'a> {
    timestamp_ms: i64,
    state: &'a WorldSnapshot,
}

/// One JSON line per frame on a writer — stdout piped into the external
/// renderer, or a file for later assembly.
pub struct JsonFrameSink<W: Write> {
    out: W,
}

impl<W: Write> JsonFrameSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> FrameSink for JsonFrameSink<W> {
    fn emit(&mut self, display_ms: i64, snapshot: &WorldSnapshot) -> Result<()> {
        let line = serde_json::to_string(&FrameLine {
            timestamp_ms: display_ms,
            state: snapshot,
        })?;
        writeln!(self.out, "{line}")?;
        Ok(())
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Earliest timestamp whose action is replayed
    pub simulation_start_ms: i64,
    /// Earliest timestamp that produces emitted frames
    pub recording_start_ms: i64,
    /// Time step for time-stepped replay
    pub step_seconds: f64,
    /// Per-action mode: a frame per visible change
    pub per_action: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub actions_applied: u64,
    pub frames: u64,
}

/// Replay `actions` (already in replay order) against a fresh model built
/// from `portals`, emitting frames per the configured mode. The stop flag is
/// polled between actions so a long replay can be halted cooperatively.
pub fn run_replay(
    portals: &[PortalRecord],
    actions: &[ActionRecord],
    options: &ReplayOptions,
    sink: &mut dyn FrameSink,
    stop: &AtomicBool,
) -> Result<ReplaySummary> {
    let mut model = WorldModel::new(portals);
    let mut summary = ReplaySummary::default();

    let replayable: Vec<&ActionRecord> = actions
        .iter()
        .filter(|a| a.timestamp >= options.simulation_start_ms)
        .collect();
    let Some(last_ms) = replayable.last().map(|a| a.timestamp) else {
        info!("replay: no actions in window, nothing to do");
        return Ok(summary);
    };

    if options.per_action {
        for action in &replayable {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let visible = model.process_action(action);
            summary.actions_applied += 1;
            if visible && action.timestamp >= options.recording_start_ms {
                sink.emit(action.timestamp, &model.snapshot())?;
                summary.frames += 1;
            }
        }
    } else {
        let step_ms = (options.step_seconds.max(1.0) * 1000.0) as i64;
        let mut next = 0;
        let mut t = options.simulation_start_ms;
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            while next < replayable.len() && replayable[next].timestamp <= t {
                model.process_action(replayable[next]);
                summary.actions_applied += 1;
                next += 1;
            }
            if t >= options.recording_start_ms {
                sink.emit(t, &model.snapshot())?;
                summary.frames += 1;
            }
            if t >= last_ms {
                break;
            }
            t += step_ms;
        }
    }

    info!(
        "replay: {} action(s) applied, {} frame(s) emitted",
        summary.actions_applied, summary.frames
    );
    Ok(summary)
}
