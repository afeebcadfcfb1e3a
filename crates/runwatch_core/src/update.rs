use runwatch_logging::{rw_debug, rw_info};
use serde_json::Value;

use crate::effect::Renderable;
use crate::event_kind::{ApplyOp, ApplyStage, EventKind};
use crate::lanes::{LaneDelta, Verdict};
use crate::line_filter::Filtered;
use crate::record::Record;
use crate::replay::line_fingerprint;
use crate::run_id::Observation;
use crate::spotlight;
use crate::timeline::{Phase, Signal};
use crate::tokenizer::Token;
use crate::{ChannelKind, Effect, Feature, Msg, RunId, RunState, RunSummary, Timestamp};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: RunState, msg: Msg) -> (RunState, Vec<Effect>) {
    let mut pass = Pass::default();

    match msg {
        Msg::StartClicked { at } => {
            if state.timeline.phase().is_active() {
                rw_debug!("start ignored: run already active");
            } else {
                let id = RunId::provisional(at);
                state.tracker.begin(id);
                state.clear_run();
                signal(&mut state, &mut pass, Signal::UserStart, at);
            }
        }
        Msg::RunAccepted { run_id, at } => {
            if gate(&mut state, &mut pass, Some(run_id), true, at) == Gate::Started {
                signal(&mut state, &mut pass, Signal::ServerRunning, at);
            }
        }
        Msg::ChannelOpened { channel, .. } => {
            rw_debug!("{} channel opened", channel);
            state.replay.reset_channel(channel);
            if channel == ChannelKind::Log {
                state.tokenizer.reset();
                state.filter.reset();
            }
        }
        Msg::ChannelLost { channel, at } => {
            rw_debug!("{} channel lost", channel);
            if channel == ChannelKind::Log {
                for token in state.tokenizer.finish() {
                    handle_token(&mut state, &mut pass, token, at);
                }
                state.filter.reset();
            }
        }
        Msg::PushEvent { name, data, at } => push_event(&mut state, &mut pass, name.as_deref(), &data, at),
        Msg::LogChunk { text, at } => {
            for token in state.tokenizer.push(&text) {
                handle_token(&mut state, &mut pass, token, at);
            }
        }
        Msg::Summary {
            channel,
            summary,
            at,
        } => apply_summary(&mut state, &mut pass, channel, summary, at),
        Msg::Tick { at } => signal(&mut state, &mut pass, Signal::Tick, at),
        Msg::Reset => {
            state.clear_run();
            signal(&mut state, &mut pass, Signal::Reset, 0);
            pass.changed = true;
        }
        Msg::NoOp => {}
    }

    let active = state.timeline.phase().is_active();
    if active != state.run_active {
        state.run_active = active;
        pass.effects.push(Effect::RunActive(active));
        pass.changed = true;
    }
    if pass.changed {
        state.mark_dirty();
        pass.effects.push(Effect::Render(state.view()));
    }

    (state, pass.effects)
}

#[derive(Debug, Default)]
struct Pass {
    effects: Vec<Effect>,
    changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Belongs to the tracked run.
    Current,
    /// Began a new run; per-run state was cleared.
    Started,
    /// Replay from the run that already completed.
    Finished,
    /// Older run; ignore.
    Stale,
}

/// Reconciles a run id carried by an update with the tracked run.
///
/// `starts` means the update itself announces a running job, so an id-less
/// update may mint a provisional id when nothing is tracked.
fn gate(state: &mut RunState, pass: &mut Pass, id: Option<RunId>, starts: bool, at: Timestamp) -> Gate {
    let active = state.timeline.phase().is_active();
    let id = match id {
        Some(id) => id,
        None if starts && !active => RunId::provisional(at),
        None => return Gate::Current,
    };

    if !id.is_provisional() && state.tracker.is_completed(&id) {
        if tracks_finished(state, &id) {
            return Gate::Finished;
        }
        // A newer run is tracked; the finished one must not leak into it.
        rw_debug!("ignoring update for finished run {} while tracking another", id);
        return Gate::Stale;
    }

    let previous = state.tracker.current();
    match state.tracker.observe(id, active) {
        Observation::Same => Gate::Current,
        Observation::Adopted => {
            if let Some(previous) = previous {
                state.timeline.rekey_completion(previous, id);
            }
            rw_debug!("adopted run id {}", id);
            pass.changed = true;
            Gate::Current
        }
        Observation::NewRun => {
            rw_info!("tracking run {}", id);
            state.clear_run();
            if active {
                signal(state, pass, Signal::Reset, at);
            }
            pass.changed = true;
            Gate::Started
        }
        Observation::Stale => {
            rw_debug!("ignoring update for stale run {}", id);
            Gate::Stale
        }
    }
}

/// `id` is the completed run and no other run has been tracked since.
fn tracks_finished(state: &RunState, id: &RunId) -> bool {
    let skew = state.tracker.skew_secs();
    state.tracker.is_completed(id)
        && state
            .tracker
            .current()
            .is_some_and(|current| current.same_run(id, skew))
}

fn signal(state: &mut RunState, pass: &mut Pass, signal: Signal, at: Timestamp) {
    let transition = state.timeline.apply(signal, at);
    if transition.changed {
        pass.changed = true;
    }
    if transition.missed_start {
        rw_info!("completion seen without a tracked start; timeline reset");
    }
    if transition.finished {
        state.tracker.mark_completed();
        if let Some(run_id) = state.tracker.current() {
            if state.timeline.claim_completion(run_id) {
                rw_info!("run {} finished", run_id);
                pass.effects.push(Effect::RefreshDownstream { run_id });
            }
        }
    }
}

fn handle_token(state: &mut RunState, pass: &mut Pass, token: Token, at: Timestamp) {
    match token {
        Token::Record(raw) => match Record::from_json_str(&raw) {
            Some(record) => handle_record(state, pass, ChannelKind::Log, record, at),
            None => rw_debug!("discarding malformed record ({} bytes)", raw.len()),
        },
        Token::Line(line) => match state.filter.filter(&line) {
            Filtered::Dropped => {}
            Filtered::Record(record) => handle_record(state, pass, ChannelKind::Log, record, at),
            Filtered::Line(rendered) => {
                if state
                    .replay
                    .admit(ChannelKind::Log, line_fingerprint(&rendered.text))
                {
                    pass.effects.push(Effect::Append(Renderable::Line(rendered)));
                }
            }
        },
    }
}

fn push_event(state: &mut RunState, pass: &mut Pass, name: Option<&str>, data: &str, at: Timestamp) {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        rw_debug!("discarding undecodable push frame");
        return;
    };
    match name {
        None | Some("message") | Some("summary") => {
            if let Some(summary) = RunSummary::from_value(&value) {
                apply_summary(state, pass, ChannelKind::Push, summary, at);
            } else if let Some(record) = Record::from_value(&value, None) {
                handle_record(state, pass, ChannelKind::Push, record, at);
            }
        }
        Some(name) => {
            if let Some(record) = Record::from_value(&value, Some(name)) {
                handle_record(state, pass, ChannelKind::Push, record, at);
            }
        }
    }
}

fn handle_record(state: &mut RunState, pass: &mut Pass, channel: ChannelKind, record: Record, at: Timestamp) {
    let fingerprint = record.fingerprint();
    let kind = record.event();
    let starts = kind == EventKind::RunStart;

    if record.run_id.is_some_and(|id| tracks_finished(state, &id)) {
        state.replay.mark_finished_run(channel);
    }
    // An id-less start with nothing active opens a new run, unless this
    // connection is known to be replaying the run that already finished.
    if starts
        && record.run_id.is_none()
        && !state.timeline.phase().is_active()
        && !state.replay.replays_finished_run(channel)
    {
        let id = RunId::provisional(at);
        rw_info!("tracking run {} started without an id", id);
        state.tracker.begin(id);
        state.clear_run();
        pass.changed = true;
    }

    if !state.replay.admit(channel, fingerprint) {
        rw_debug!("dropping replayed {} from {}", record.kind, channel);
        return;
    }

    if starts || record.run_id.is_some() {
        match gate(state, pass, record.run_id, starts, at) {
            Gate::Current => {}
            // The guard was cleared with the rest of the run.
            Gate::Started => {
                state.replay.admit(channel, fingerprint);
            }
            Gate::Finished | Gate::Stale => return,
        }
    }

    if let Some(feature) = record.feature {
        state.current_feature = Some(feature);
    }
    let feature = record.feature.or(state.current_feature);

    if let Some(block) = state.classifier.classify(&record) {
        pass.effects.push(Effect::Append(Renderable::Block(block)));
    }

    match kind {
        EventKind::RunStart => {
            signal(state, pass, Signal::ServerRunning, at);
            signal(state, pass, Signal::Structural, at);
        }
        EventKind::RunPair
        | EventKind::PairStart
        | EventKind::FeatureStart
        | EventKind::TwoStart
        | EventKind::Plan => signal(state, pass, Signal::Structural, at),
        EventKind::SnapshotStart => signal(state, pass, Signal::SnapshotStarted, at),
        EventKind::SnapshotProgress => {
            let (done, total) = progress(&record);
            signal(state, pass, Signal::SnapshotProgress { done, total }, at);
        }
        EventKind::Apply { op, stage, .. } => match stage {
            ApplyStage::Start => signal(state, pass, Signal::ApplyStarted, at),
            ApplyStage::Progress => {
                let (done, total) = progress(&record);
                signal(state, pass, Signal::ApplyProgress { done, total }, at);
            }
            ApplyStage::Done => {
                signal(state, pass, Signal::ApplyDone, at);
                if let Some(feature) = feature {
                    apply_done(state, pass, feature, op, &record, at);
                }
            }
        },
        EventKind::ApplyProgress => {
            let (done, total) = progress(&record);
            signal(state, pass, Signal::ApplyProgress { done, total }, at);
        }
        EventKind::ApplyCorrected => {
            if let (Some(feature), Some(effective)) = (feature, record.counts.effective) {
                let (added, removed, updated) = state.cumulative.correct_added(feature, effective);
                let delta = LaneDelta {
                    added,
                    removed,
                    updated,
                    ..LaneDelta::default()
                };
                merge_lane(state, pass, feature, delta, at);
            }
        }
        EventKind::Spotlight => {
            if let Some(feature) = feature {
                let current = state.lanes.get(feature).cloned().unwrap_or_default();
                let delta = LaneDelta {
                    added: current.added,
                    removed: current.removed,
                    updated: current.updated,
                    spotlight: record.spotlight.clone(),
                    items: record.items.clone(),
                };
                merge_lane(state, pass, feature, delta, at);
            }
        }
        EventKind::FeatureDone => {
            let counts = &record.counts;
            if let Some(feature) = feature {
                if counts.added.is_some() || counts.removed.is_some() || counts.updated.is_some() {
                    let delta = LaneDelta {
                        added: counts.added.unwrap_or(0),
                        removed: counts.removed.unwrap_or(0),
                        updated: counts.updated.unwrap_or(0),
                        spotlight: record.spotlight.clone(),
                        items: record.items.clone(),
                    };
                    merge_lane(state, pass, feature, delta, at);
                }
            }
        }
        EventKind::RunDone => signal(state, pass, Signal::Completed, at),
        EventKind::RunError | EventKind::RunAborted => {
            rw_info!(
                "run failed: {}",
                record.message.as_deref().unwrap_or("no reason given")
            );
            signal(state, pass, Signal::Failed, at);
        }
        EventKind::RunExit => signal(
            state,
            pass,
            Signal::ServerStopped {
                exit_code: record.exit_code,
            },
            at,
        ),
        EventKind::TwoDone | EventKind::Other => {}
    }
}

fn apply_done(
    state: &mut RunState,
    pass: &mut Pass,
    feature: Feature,
    op: ApplyOp,
    record: &Record,
    at: Timestamp,
) {
    let count = record.counts.count.unwrap_or(0);
    let (added, removed, updated) = state.cumulative.add(feature, op, count);
    let hints = if record.spotlight.is_empty() {
        spotlight::synthesize(feature, &record.items, Some(op))
    } else {
        record.spotlight.clone()
    };
    let delta = LaneDelta {
        added,
        removed,
        updated,
        spotlight: hints,
        items: Vec::new(),
    };
    merge_lane(state, pass, feature, delta, at);
}

fn progress(record: &Record) -> (u64, u64) {
    (
        record.counts.done.unwrap_or(0),
        record.counts.total.unwrap_or(0),
    )
}

fn merge_lane(state: &mut RunState, pass: &mut Pass, feature: Feature, delta: LaneDelta, at: Timestamp) {
    if state.enabled.get(&feature) == Some(&false) {
        return;
    }
    let running = state.timeline.phase().is_running();
    let result = state.lanes.merge(feature, delta, at, running);
    match result.verdict {
        Verdict::Accepted | Verdict::Ignored => {}
        Verdict::RejectedStale | Verdict::RejectedZeroWipe => {
            rw_debug!("{} merge rejected: {:?}", feature, result.verdict);
        }
    }
    if result.changed {
        pass.changed = true;
    }
}

fn apply_summary(
    state: &mut RunState,
    pass: &mut Pass,
    channel: ChannelKind,
    summary: RunSummary,
    at: Timestamp,
) {
    let phase = state.timeline.phase();
    let gate = match summary.run_id {
        Some(id) => gate(state, pass, Some(id), summary.running, at),
        // Without an id only an idle timeline may be started by a summary.
        None if summary.running && !summary.reports_finished() && phase == Phase::Idle => {
            gate(state, pass, None, true, at)
        }
        None => Gate::Current,
    };
    if gate == Gate::Stale {
        return;
    }
    let finished = summary.reports_finished();
    let exit_code = summary.exit_code;

    for (feature, flag) in &summary.enabled {
        if state.enabled.insert(*feature, *flag) != Some(*flag) {
            pass.changed = true;
        }
    }
    for (feature, delta) in summary.lanes {
        merge_lane(state, pass, feature, delta, at);
    }

    if gate == Gate::Finished {
        return;
    }

    if finished {
        signal(state, pass, Signal::ServerStopped { exit_code }, at);
    } else if summary.running {
        if matches!(phase, Phase::Done | Phase::Error) && gate != Gate::Started {
            rw_debug!("{} summary still reports the finished run as running", channel);
            return;
        }
        signal(state, pass, Signal::ServerRunning, at);
        if summary.flags.pre {
            signal(state, pass, Signal::Structural, at);
        }
        if summary.flags.post {
            signal(state, pass, Signal::ApplyStarted, at);
        }
    }
}
