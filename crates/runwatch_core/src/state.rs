use std::collections::BTreeMap;

use crate::classifier::EventClassifier;
use crate::lanes::{CumulativeTotals, LaneAggregator};
use crate::line_filter::LineFilter;
use crate::replay::ReplayGuard;
use crate::run_id::RunTracker;
use crate::timeline::{RunTimeline, TimelineCoordinator};
use crate::tokenizer::ChunkTokenizer;
use crate::view_model::{self, RunSnapshot};
use crate::{Feature, PipelineSettings, RunId};

/// All pipeline state, owned in one place and only changed by [`crate::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub(crate) tracker: RunTracker,
    pub(crate) timeline: TimelineCoordinator,
    pub(crate) lanes: LaneAggregator,
    pub(crate) cumulative: CumulativeTotals,
    pub(crate) classifier: EventClassifier,
    pub(crate) filter: LineFilter,
    pub(crate) tokenizer: ChunkTokenizer,
    pub(crate) replay: ReplayGuard,
    pub(crate) enabled: BTreeMap<Feature, bool>,
    /// Lane named by the most recent record that named one.
    pub(crate) current_feature: Option<Feature>,
    pub(crate) run_active: bool,
    dirty: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(&PipelineSettings::default())
    }
}

impl RunState {
    pub fn new(settings: &PipelineSettings) -> Self {
        Self {
            tracker: RunTracker::new(settings.run_id_skew_secs, settings.adopt_window_secs),
            timeline: TimelineCoordinator::new(settings),
            lanes: LaneAggregator::new(),
            cumulative: CumulativeTotals::default(),
            classifier: EventClassifier::new(),
            filter: LineFilter::new(),
            tokenizer: ChunkTokenizer::new(),
            replay: ReplayGuard::new(),
            enabled: BTreeMap::new(),
            current_feature: None,
            run_active: false,
            dirty: false,
        }
    }

    pub fn view(&self) -> RunSnapshot {
        view_model::build(
            self.tracker.current(),
            self.timeline.timeline(),
            self.lanes.lanes(),
            &self.enabled,
        )
    }

    pub fn timeline(&self) -> RunTimeline {
        self.timeline.timeline()
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.tracker.current()
    }

    pub fn pending_log_text(&self) -> &str {
        self.tokenizer.pending()
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clears per-run state for a newly observed run. Enablement flags and
    /// stream buffers survive.
    pub(crate) fn clear_run(&mut self) {
        self.lanes.clear();
        self.cumulative.clear();
        self.classifier.reset();
        self.replay.clear();
        self.current_feature = None;
    }
}
