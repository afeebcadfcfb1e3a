//! Run lifecycle state machine.
//!
//! All channels feed [`Signal`]s into [`TimelineCoordinator::apply`]; the
//! timeline is never mutated any other way.

use std::fmt;

use runwatch_logging::{rw_debug, rw_info};

use crate::{PipelineSettings, RunId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubPhase {
    PreScan,
    Snapshot,
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Init,
    Running(SubPhase),
    Done,
    Error,
}

impl Phase {
    /// A run is tracked and has not finished.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Init | Phase::Running(_))
    }

    pub fn is_running(self) -> bool {
        matches!(self, Phase::Running(_))
    }

    /// Percentage band `(floor, ceiling)` for the phase.
    pub fn band(self) -> (u8, u8) {
        match self {
            Phase::Idle => (0, 0),
            Phase::Init => (0, 5),
            Phase::Running(SubPhase::PreScan) => (5, 20),
            Phase::Running(SubPhase::Snapshot) => (20, 50),
            Phase::Running(SubPhase::Apply) => (50, 95),
            Phase::Done => (100, 100),
            // Error freezes wherever the run stopped.
            Phase::Error => (0, 100),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Init => "init",
            Phase::Running(SubPhase::PreScan) => "running:prescan",
            Phase::Running(SubPhase::Snapshot) => "running:snapshot",
            Phase::Running(SubPhase::Apply) => "running:apply",
            Phase::Done => "done",
            Phase::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunTimeline {
    pub phase: Phase,
    pub pct: u8,
    pub started_at: Option<Timestamp>,
    pub last_event_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Explicit user start, before any server confirmation.
    UserStart,
    /// A push or poll update reports `running=true`.
    ServerRunning,
    /// A poll or exit marker reports the process stopped.
    ServerStopped { exit_code: Option<i64> },
    /// A pair/feature start record.
    Structural,
    SnapshotStarted,
    SnapshotProgress { done: u64, total: u64 },
    ApplyStarted,
    ApplyProgress { done: u64, total: u64 },
    ApplyDone,
    /// Explicit completion record.
    Completed,
    /// Explicit error or abort record.
    Failed,
    Reset,
    /// Drift timer.
    Tick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub changed: bool,
    /// The run reached `Done` with this signal.
    pub finished: bool,
    /// A completion arrived with no run tracked; the timeline was reset.
    pub missed_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineCoordinator {
    timeline: RunTimeline,
    start_grace_ms: u64,
    drift_step: u8,
    optimistic: bool,
    completion_fired_for: Option<RunId>,
}

impl TimelineCoordinator {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            timeline: RunTimeline::default(),
            start_grace_ms: settings.start_grace_ms,
            drift_step: settings.drift_step,
            optimistic: false,
            completion_fired_for: None,
        }
    }

    pub fn timeline(&self) -> RunTimeline {
        self.timeline
    }

    pub fn phase(&self) -> Phase {
        self.timeline.phase
    }

    pub fn apply(&mut self, signal: Signal, at: Timestamp) -> Transition {
        let before = self.timeline;
        let phase = before.phase;
        let mut transition = Transition::default();

        if signal != Signal::Tick && phase.is_active() {
            self.timeline.last_event_at = Some(at);
        }

        match signal {
            Signal::UserStart => {
                if !phase.is_active() {
                    self.enter_init(at, true);
                }
            }
            Signal::ServerRunning => {
                if !phase.is_active() {
                    self.enter_init(at, false);
                } else {
                    self.optimistic = false;
                }
            }
            Signal::Structural => {
                if phase == Phase::Init {
                    self.enter(SubPhase::PreScan, None);
                }
            }
            Signal::SnapshotStarted => {
                if phase.is_active() {
                    self.enter(SubPhase::Snapshot, None);
                }
            }
            Signal::SnapshotProgress { done, total } => {
                if phase.is_active() {
                    self.enter(SubPhase::Snapshot, Some((done, total)));
                }
            }
            Signal::ApplyStarted | Signal::ApplyDone => {
                if phase.is_active() {
                    self.enter(SubPhase::Apply, None);
                }
            }
            Signal::ApplyProgress { done, total } => {
                if phase.is_active() {
                    self.enter(SubPhase::Apply, Some((done, total)));
                }
            }
            Signal::Completed => match phase {
                Phase::Idle => {
                    transition.missed_start = true;
                    self.reset();
                }
                Phase::Init | Phase::Running(_) => {
                    self.finish();
                    transition.finished = true;
                }
                Phase::Done | Phase::Error => {}
            },
            Signal::ServerStopped { exit_code } => {
                if phase == Phase::Init && self.optimistic && self.within_grace(at) {
                    rw_debug!("ignoring stopped report inside start grace window");
                } else if phase.is_active() {
                    // Only explicit error records fail a run; an exit code is just reported.
                    if let Some(code) = exit_code.filter(|code| *code != 0) {
                        rw_info!("run exited with code {}", code);
                    }
                    self.finish();
                    transition.finished = true;
                }
            }
            Signal::Failed => {
                if phase.is_active() {
                    self.timeline.phase = Phase::Error;
                }
            }
            Signal::Reset => self.reset(),
            Signal::Tick => {
                if phase.is_active() {
                    let (_, ceiling) = phase.band();
                    let next = self.timeline.pct.saturating_add(self.drift_step).min(ceiling);
                    self.timeline.pct = self.timeline.pct.max(next);
                }
            }
        }

        if self.timeline.phase != before.phase {
            rw_info!("timeline {} -> {}", before.phase, self.timeline.phase);
        }
        transition.changed = self.timeline.phase != before.phase || self.timeline.pct != before.pct;
        transition
    }

    /// Records that completion side effects fired for `run_id`. Returns `false`
    /// if they already had.
    pub fn claim_completion(&mut self, run_id: RunId) -> bool {
        if self.completion_fired_for == Some(run_id) {
            return false;
        }
        self.completion_fired_for = Some(run_id);
        true
    }

    /// The id is adopted from provisional to issued; keep the claim attached.
    pub fn rekey_completion(&mut self, from: RunId, to: RunId) {
        if self.completion_fired_for == Some(from) {
            self.completion_fired_for = Some(to);
        }
    }

    fn enter_init(&mut self, at: Timestamp, optimistic: bool) {
        self.timeline = RunTimeline {
            phase: Phase::Init,
            pct: 0,
            started_at: Some(at),
            last_event_at: Some(at),
        };
        self.optimistic = optimistic;
    }

    fn enter(&mut self, sub: SubPhase, progress: Option<(u64, u64)>) {
        let phase = Phase::Running(sub);
        self.timeline.phase = phase;
        self.optimistic = false;
        let (floor, ceiling) = phase.band();
        let target = match progress {
            Some((done, total)) if total > 0 => {
                let ratio = done.min(total) as f64 / total as f64;
                floor + ((ceiling - floor) as f64 * ratio).round() as u8
            }
            _ => floor,
        };
        // Never backwards within a run.
        self.timeline.pct = self.timeline.pct.max(target.min(100));
    }

    fn finish(&mut self) {
        self.timeline.phase = Phase::Done;
        self.timeline.pct = 100;
        self.optimistic = false;
    }

    fn reset(&mut self) {
        self.timeline = RunTimeline::default();
        self.optimistic = false;
    }

    fn within_grace(&self, at: Timestamp) -> bool {
        self.timeline
            .started_at
            .is_some_and(|started| at.saturating_sub(started) < self.start_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_never_overlap_backwards() {
        let order = [
            Phase::Init,
            Phase::Running(SubPhase::PreScan),
            Phase::Running(SubPhase::Snapshot),
            Phase::Running(SubPhase::Apply),
            Phase::Done,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].band().1 <= pair[1].band().0, "{} -> {}", pair[0], pair[1]);
        }
    }
}
