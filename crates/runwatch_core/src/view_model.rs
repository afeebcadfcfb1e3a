use std::collections::BTreeMap;

use serde::Serialize;

use crate::lanes::LaneStats;
use crate::timeline::RunTimeline;
use crate::{Feature, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LaneTotals {
    pub added: u64,
    pub removed: u64,
    pub updated: u64,
}

/// What the renderer gets: enabled lanes only, plus the canonical timeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSnapshot {
    pub run_id: Option<RunId>,
    pub timeline: RunTimeline,
    pub lanes: BTreeMap<Feature, LaneStats>,
    pub enabled: BTreeMap<Feature, bool>,
    pub run_active: bool,
    pub totals: LaneTotals,
}

impl RunSnapshot {
    pub fn lane(&self, feature: Feature) -> Option<&LaneStats> {
        self.lanes.get(&feature)
    }
}

pub(crate) fn build(
    run_id: Option<RunId>,
    timeline: RunTimeline,
    lanes: &BTreeMap<Feature, LaneStats>,
    enabled: &BTreeMap<Feature, bool>,
) -> RunSnapshot {
    let visible: BTreeMap<Feature, LaneStats> = lanes
        .iter()
        .filter(|(feature, _)| enabled.get(feature).copied().unwrap_or(true))
        .map(|(feature, stats)| (*feature, stats.clone()))
        .collect();
    let totals = visible.values().fold(LaneTotals::default(), |acc, lane| LaneTotals {
        added: acc.added + lane.added,
        removed: acc.removed + lane.removed,
        updated: acc.updated + lane.updated,
    });
    RunSnapshot {
        run_id,
        timeline,
        lanes: visible,
        enabled: enabled.clone(),
        run_active: timeline.phase.is_active(),
        totals,
    }
}
