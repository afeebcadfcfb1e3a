//! Plain-text rendering of snapshots and scrollback items.

use chrono::{DateTime, Local};
use runwatch_core::{Block, Feature, LaneStats, LineLevel, Renderable, RunSnapshot};

const SAMPLE_LIMIT: usize = 3;

pub fn render_snapshot(snapshot: &RunSnapshot) -> Vec<String> {
    let mut lines = vec![header(snapshot)];
    lines.extend(
        snapshot
            .lanes
            .iter()
            .map(|(feature, stats)| lane_line(*feature, stats)),
    );
    lines
}

fn header(snapshot: &RunSnapshot) -> String {
    let timeline = &snapshot.timeline;
    let mut text = format!("[{:<16} {:>3}%]", timeline.phase.to_string(), timeline.pct);
    if let Some(run_id) = snapshot.run_id {
        text.push_str(&format!(" run {run_id}"));
    }
    if let Some(started) = timeline
        .started_at
        .and_then(|ms| i64::try_from(ms).ok())
        .and_then(DateTime::from_timestamp_millis)
    {
        text.push_str(&format!(
            " started {}",
            started.with_timezone(&Local).format("%H:%M:%S")
        ));
    }
    let totals = snapshot.totals;
    text.push_str(&format!(
        " | +{} / -{} / ~{}",
        format_with_commas(totals.added),
        format_with_commas(totals.removed),
        format_with_commas(totals.updated)
    ));
    text
}

fn lane_line(feature: Feature, stats: &LaneStats) -> String {
    let counts = format!(
        "  {:<10} +{} / -{} / ~{}",
        feature.as_str(),
        format_with_commas(stats.added),
        format_with_commas(stats.removed),
        format_with_commas(stats.updated)
    );
    let samples: Vec<String> = [
        ('+', &stats.spotlight_add),
        ('-', &stats.spotlight_remove),
        ('~', &stats.spotlight_update),
    ]
    .into_iter()
    .flat_map(|(sign, titles)| titles.iter().map(move |title| format!("{sign}{title}")))
    .take(SAMPLE_LIMIT)
    .collect();
    if samples.is_empty() {
        counts
    } else {
        format!("{counts}  ({})", samples.join(", "))
    }
}

pub fn render_renderable(item: &Renderable) -> String {
    match item {
        Renderable::Block(block) => block_text(block),
        Renderable::Line(line) => match line.level {
            LineLevel::Plain | LineLevel::Info => line.text.clone(),
            LineLevel::Warn => format!("warning: {}", line.text),
            LineLevel::Debug => format!("debug: {}", line.text),
        },
    }
}

fn block_text(block: &Block) -> String {
    match block {
        Block::RunStarted { dry_run } => {
            if *dry_run {
                "== run started (dry run) ==".to_string()
            } else {
                "== run started ==".to_string()
            }
        }
        Block::PairStarted {
            index,
            total,
            src,
            dst,
        } => {
            let position = match (index, total) {
                (Some(i), Some(n)) => format!(" {i}/{n}"),
                _ => String::new(),
            };
            format!(
                "-- pair{position}: {} -> {}",
                src.as_deref().unwrap_or("?"),
                dst.as_deref().unwrap_or("?")
            )
        }
        Block::FeatureStarted { feature } => format!("   feature {}", lane_name(*feature)),
        Block::SnapshotStarted { feature, dst } => match dst {
            Some(dst) => format!("   snapshot {} @ {dst}", lane_name(*feature)),
            None => format!("   snapshot {}", lane_name(*feature)),
        },
        Block::ApplySummary { feature, entries } => {
            let parts: Vec<String> = entries
                .iter()
                .map(|entry| {
                    let target = if entry.dst.is_empty() {
                        String::new()
                    } else {
                        format!(" @ {}", entry.dst)
                    };
                    format!("{} {}{target}", entry.op.as_str(), entry.count)
                })
                .collect();
            format!("   {} applied: {}", lane_name(*feature), parts.join(", "))
        }
        Block::Corrected { feature, effective } => format!(
            "   {} corrected to {} effective adds",
            lane_name(*feature),
            format_with_commas(*effective)
        ),
        Block::RunFinished {
            added,
            removed,
            pairs,
        } => {
            let pairs = pairs.map(|n| format!(" across {n} pairs")).unwrap_or_default();
            format!(
                "== run finished: +{} / -{}{pairs} ==",
                format_with_commas(*added),
                format_with_commas(*removed)
            )
        }
        Block::RunFailed { message } => {
            format!("== run failed: {} ==", message.as_deref().unwrap_or("unknown error"))
        }
        Block::RunAborted { message } => {
            format!("== run aborted: {} ==", message.as_deref().unwrap_or("no reason given"))
        }
    }
}

fn lane_name(feature: Option<Feature>) -> &'static str {
    feature.map(Feature::as_str).unwrap_or("all")
}

fn format_with_commas(value: u64) -> String {
    let mut out = String::new();
    for (i, ch) in value.to_string().chars().rev().enumerate() {
        if i != 0 && i % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use runwatch_core::{
        ApplyOp, ApplyTally, LaneTotals, Phase, RenderableLine, RunTimeline, SubPhase,
    };

    use super::*;

    fn snapshot() -> RunSnapshot {
        let mut lanes = BTreeMap::new();
        lanes.insert(
            Feature::Watchlist,
            LaneStats {
                added: 1234,
                removed: 2,
                spotlight_add: vec!["Dune".to_string(), "Alien".to_string()],
                spotlight_remove: vec!["Heat".to_string(), "Ran".to_string()],
                ..LaneStats::default()
            },
        );
        lanes.insert(Feature::Ratings, LaneStats::default());
        RunSnapshot {
            run_id: None,
            timeline: RunTimeline {
                phase: Phase::Running(SubPhase::Apply),
                pct: 62,
                started_at: None,
                last_event_at: None,
            },
            lanes,
            enabled: BTreeMap::new(),
            run_active: true,
            totals: LaneTotals {
                added: 1234,
                removed: 2,
                updated: 0,
            },
        }
    }

    #[test]
    fn snapshot_renders_header_and_lanes() {
        let lines = render_snapshot(&snapshot());
        assert_eq!(
            lines,
            vec![
                "[running:apply     62%] | +1,234 / -2 / ~0".to_string(),
                "  watchlist  +1,234 / -2 / ~0  (+Dune, +Alien, -Heat)".to_string(),
                "  ratings    +0 / -0 / ~0".to_string(),
            ]
        );
    }

    #[test]
    fn apply_summary_lists_each_destination() {
        let block = Block::ApplySummary {
            feature: Some(Feature::Watchlist),
            entries: vec![
                ApplyTally {
                    op: ApplyOp::Add,
                    dst: "PLEX".to_string(),
                    count: 3,
                },
                ApplyTally {
                    op: ApplyOp::Remove,
                    dst: String::new(),
                    count: 1,
                },
            ],
        };
        assert_eq!(
            render_renderable(&Renderable::Block(block)),
            "   watchlist applied: add 3 @ PLEX, remove 1"
        );
    }

    #[test]
    fn lines_carry_their_level() {
        let line = Renderable::Line(RenderableLine {
            text: "provider rate limited".to_string(),
            level: LineLevel::Warn,
        });
        assert_eq!(render_renderable(&line), "warning: provider rate limited");
        let finished = Renderable::Block(Block::RunFinished {
            added: 5,
            removed: 0,
            pairs: Some(1),
        });
        assert_eq!(
            render_renderable(&finished),
            "== run finished: +5 / -0 across 1 pairs =="
        );
    }

    #[test]
    fn commas_group_thousands() {
        assert_eq!(format_with_commas(0), "0");
        assert_eq!(format_with_commas(1000), "1,000");
        assert_eq!(format_with_commas(1234567), "1,234,567");
    }
}
