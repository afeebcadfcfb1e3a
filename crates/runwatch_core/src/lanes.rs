use std::collections::BTreeMap;

use runwatch_logging::rw_debug;
use serde::Serialize;

use crate::event_kind::ApplyOp;
use crate::record::{Item, SpotlightHints};
use crate::spotlight;
use crate::{Feature, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LaneStats {
    pub added: u64,
    pub removed: u64,
    pub updated: u64,
    pub spotlight_add: Vec<String>,
    pub spotlight_remove: Vec<String>,
    pub spotlight_update: Vec<String>,
    pub last_update_ts: Timestamp,
}

impl LaneStats {
    pub fn total(&self) -> u64 {
        self.added + self.removed + self.updated
    }
}

/// Cumulative-to-date figures reported by one channel for one lane.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaneDelta {
    pub added: u64,
    pub removed: u64,
    pub updated: u64,
    pub spotlight: SpotlightHints,
    /// Raw items, used to synthesize spotlight lists when `spotlight` is empty.
    pub items: Vec<Item>,
}

impl LaneDelta {
    pub fn total(&self) -> u64 {
        self.added + self.removed + self.updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    /// Zero totals for an untracked lane: nothing to create.
    Ignored,
    /// A zero update while running would have wiped non-zero stats.
    RejectedZeroWipe,
    /// Older than the lane's last accepted update.
    RejectedStale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub stats: LaneStats,
    pub verdict: Verdict,
    /// Counters or spotlight lists moved (a bare timestamp advance does not count).
    pub changed: bool,
}

impl MergeResult {
    fn unchanged(stats: LaneStats, verdict: Verdict) -> Self {
        Self {
            stats,
            verdict,
            changed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaneAggregator {
    lanes: BTreeMap<Feature, LaneStats>,
}

impl LaneAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges cumulative figures into a lane.
    ///
    /// `running` is whether the timeline is in the `Running` phase; the
    /// zero-wipe guard only applies then.
    pub fn merge(&mut self, feature: Feature, delta: LaneDelta, ts: Timestamp, running: bool) -> MergeResult {
        let Some(previous) = self.lanes.get(&feature) else {
            if delta.total() == 0 && delta.spotlight.is_empty() && delta.items.is_empty() {
                return MergeResult::unchanged(LaneStats::default(), Verdict::Ignored);
            }
            let mut stats = LaneStats::default();
            apply(&mut stats, feature, delta, ts);
            self.lanes.insert(feature, stats.clone());
            return MergeResult {
                stats,
                verdict: Verdict::Accepted,
                changed: true,
            };
        };

        if ts < previous.last_update_ts {
            rw_debug!(
                "lane {} rejected stale update ts={} < last={}",
                feature,
                ts,
                previous.last_update_ts
            );
            return MergeResult::unchanged(previous.clone(), Verdict::RejectedStale);
        }

        if running && delta.total() == 0 && previous.total() != 0 {
            rw_debug!(
                "lane {} rejected zero-wipe (previous total {})",
                feature,
                previous.total()
            );
            return MergeResult::unchanged(previous.clone(), Verdict::RejectedZeroWipe);
        }

        let stats = self.lanes.entry(feature).or_default();
        let changed = apply(stats, feature, delta, ts);
        MergeResult {
            stats: stats.clone(),
            verdict: Verdict::Accepted,
            changed,
        }
    }

    pub fn get(&self, feature: Feature) -> Option<&LaneStats> {
        self.lanes.get(&feature)
    }

    pub fn lanes(&self) -> &BTreeMap<Feature, LaneStats> {
        &self.lanes
    }

    pub fn clear(&mut self) {
        self.lanes.clear();
    }
}

fn apply(stats: &mut LaneStats, feature: Feature, delta: LaneDelta, ts: Timestamp) -> bool {
    let counters = (stats.added, stats.removed, stats.updated);
    stats.added = stats.added.max(delta.added);
    stats.removed = stats.removed.max(delta.removed);
    stats.updated = stats.updated.max(delta.updated);
    stats.last_update_ts = stats.last_update_ts.max(ts);

    let hints = if delta.spotlight.is_empty() {
        spotlight::synthesize(feature, &delta.items, None)
    } else {
        delta.spotlight
    };
    let mut changed = counters != (stats.added, stats.removed, stats.updated);
    changed |= spotlight::extend_unique(&mut stats.spotlight_add, &hints.add);
    changed |= spotlight::extend_unique(&mut stats.spotlight_remove, &hints.remove);
    changed |= spotlight::extend_unique(&mut stats.spotlight_update, &hints.update);
    changed
}

/// Per-run running sums of admitted apply-done counts, so the aggregator only
/// ever sees cumulative figures.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CumulativeTotals {
    lanes: BTreeMap<Feature, (u64, u64, u64)>,
}

impl CumulativeTotals {
    pub fn add(&mut self, feature: Feature, op: ApplyOp, count: u64) -> (u64, u64, u64) {
        let entry = self.lanes.entry(feature).or_default();
        match op {
            ApplyOp::Add => entry.0 += count,
            ApplyOp::Remove => entry.1 += count,
            ApplyOp::Update => entry.2 += count,
        }
        *entry
    }

    /// Raises the added sum to `effective` if it is lower.
    pub fn correct_added(&mut self, feature: Feature, effective: u64) -> (u64, u64, u64) {
        let entry = self.lanes.entry(feature).or_default();
        entry.0 = entry.0.max(effective);
        *entry
    }

    pub fn get(&self, feature: Feature) -> (u64, u64, u64) {
        self.lanes.get(&feature).copied().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.lanes.clear();
    }
}
