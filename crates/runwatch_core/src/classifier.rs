//! Maps normalized records to renderer-facing blocks.
//!
//! Mostly a table lookup on the record's kind, except for apply steps: their
//! `start` records are suppressed and their `done` counts are tallied per
//! (operation, destination) until the pair or feature completes.

use std::collections::BTreeMap;

use crate::event_kind::{ApplyOp, ApplyStage, EventKind};
use crate::record::Record;
use crate::Feature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyTally {
    pub op: ApplyOp,
    pub dst: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    RunStarted {
        dry_run: bool,
    },
    PairStarted {
        index: Option<u64>,
        total: Option<u64>,
        src: Option<String>,
        dst: Option<String>,
    },
    FeatureStarted {
        feature: Option<Feature>,
    },
    SnapshotStarted {
        feature: Option<Feature>,
        dst: Option<String>,
    },
    ApplySummary {
        feature: Option<Feature>,
        entries: Vec<ApplyTally>,
    },
    Corrected {
        feature: Option<Feature>,
        effective: u64,
    },
    RunFinished {
        added: u64,
        removed: u64,
        pairs: Option<u64>,
    },
    RunFailed {
        message: Option<String>,
    },
    RunAborted {
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventClassifier {
    tally: BTreeMap<(ApplyOp, String), u64>,
    tally_feature: Option<Feature>,
    started: bool,
    finished: bool,
}

impl EventClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, record: &Record) -> Option<Block> {
        match record.event() {
            EventKind::RunStart => {
                if self.started {
                    return None;
                }
                self.started = true;
                Some(Block::RunStarted {
                    dry_run: record.dry_run,
                })
            }
            EventKind::RunPair | EventKind::PairStart => Some(Block::PairStarted {
                index: record.ordinal.map(|(i, _)| i),
                total: record.ordinal.map(|(_, n)| n),
                src: record.src.clone(),
                dst: record.dst.clone(),
            }),
            EventKind::FeatureStart => Some(Block::FeatureStarted {
                feature: record.feature,
            }),
            EventKind::SnapshotStart => Some(Block::SnapshotStarted {
                feature: record.feature,
                dst: record.dst.clone(),
            }),
            EventKind::Apply {
                stage: ApplyStage::Start | ApplyStage::Progress,
                ..
            } => None,
            EventKind::Apply {
                op,
                stage: ApplyStage::Done,
                ..
            } => {
                let dst = record.dst.clone().unwrap_or_default();
                *self.tally.entry((op, dst)).or_insert(0) += record.counts.count.unwrap_or(0);
                if record.feature.is_some() {
                    self.tally_feature = record.feature;
                }
                None
            }
            EventKind::TwoDone | EventKind::FeatureDone => self.flush(),
            EventKind::ApplyCorrected => record.counts.effective.map(|effective| Block::Corrected {
                feature: record.feature,
                effective,
            }),
            EventKind::RunDone => {
                self.tally.clear();
                self.tally_feature = None;
                if self.finished {
                    return None;
                }
                self.finished = true;
                Some(Block::RunFinished {
                    added: record.counts.added.unwrap_or(0),
                    removed: record.counts.removed.unwrap_or(0),
                    pairs: record.counts.pairs,
                })
            }
            EventKind::RunError => Some(Block::RunFailed {
                message: record.message.clone(),
            }),
            EventKind::RunAborted => Some(Block::RunAborted {
                message: record.message.clone(),
            }),
            EventKind::SnapshotProgress
            | EventKind::TwoStart
            | EventKind::Plan
            | EventKind::ApplyProgress
            | EventKind::RunExit
            | EventKind::Spotlight
            | EventKind::Other => None,
        }
    }

    /// Clears all per-run state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn pending_tally(&self) -> usize {
        self.tally.len()
    }

    fn flush(&mut self) -> Option<Block> {
        if self.tally.is_empty() {
            return None;
        }
        let entries = std::mem::take(&mut self.tally)
            .into_iter()
            .map(|((op, dst), count)| ApplyTally { op, dst, count })
            .collect();
        Some(Block::ApplySummary {
            feature: self.tally_feature.take(),
            entries,
        })
    }
}
