#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApplyOp {
    Add,
    Remove,
    Update,
}

impl ApplyOp {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "add" => Some(ApplyOp::Add),
            "remove" => Some(ApplyOp::Remove),
            "update" => Some(ApplyOp::Update),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOp::Add => "add",
            ApplyOp::Remove => "remove",
            ApplyOp::Update => "update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Start,
    Progress,
    Done,
}

/// Which side of a two-way pair an apply step writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Semantic meaning of a record's `kind` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RunStart,
    RunPair,
    PairStart,
    FeatureStart,
    FeatureDone,
    SnapshotStart,
    SnapshotProgress,
    TwoStart,
    Plan,
    Apply {
        op: ApplyOp,
        side: Option<Side>,
        stage: ApplyStage,
    },
    /// Synthetic `progress:apply` event from the summary stream.
    ApplyProgress,
    /// Upward correction of a lane's effective added count.
    ApplyCorrected,
    TwoDone,
    RunDone,
    RunError,
    RunAborted,
    /// Process exit marker synthesized from the log tail.
    RunExit,
    Spotlight,
    Other,
}

impl EventKind {
    /// `message` is the record's `msg` field; `debug` records use it as a sub-tag.
    pub fn parse(kind: &str, message: Option<&str>) -> Self {
        match kind {
            "run:start" => return EventKind::RunStart,
            "run:pair" => return EventKind::RunPair,
            "pair:start" => return EventKind::PairStart,
            "feature:start" => return EventKind::FeatureStart,
            "feature:done" => return EventKind::FeatureDone,
            "snapshot:start" => return EventKind::SnapshotStart,
            "snapshot:progress" => return EventKind::SnapshotProgress,
            "two:start" => return EventKind::TwoStart,
            "plan" | "one:plan" | "two:plan" => return EventKind::Plan,
            "progress:apply" => return EventKind::ApplyProgress,
            "two:done" => return EventKind::TwoDone,
            "run:done" => return EventKind::RunDone,
            "run:error" => return EventKind::RunError,
            "run:aborted" => return EventKind::RunAborted,
            "run:exit" => return EventKind::RunExit,
            "spotlight" => return EventKind::Spotlight,
            "debug" => {
                return match message {
                    Some("apply:add:corrected") => EventKind::ApplyCorrected,
                    _ => EventKind::Other,
                }
            }
            _ => {}
        }

        let parts: Vec<&str> = kind.split(':').collect();
        match parts.as_slice() {
            ["apply", op, stage] => apply_kind(op, None, stage),
            ["two", "apply", op, "corrected"] if *op == "add" => EventKind::ApplyCorrected,
            ["two", "apply", op, side, stage] => {
                let side = match *side {
                    "A" | "a" => Some(Side::A),
                    "B" | "b" => Some(Side::B),
                    _ => return EventKind::Other,
                };
                apply_kind(op, side, stage)
            }
            _ => EventKind::Other,
        }
    }
}

fn apply_kind(op: &str, side: Option<Side>, stage: &str) -> EventKind {
    let Some(op) = ApplyOp::parse(op) else {
        return EventKind::Other;
    };
    let stage = match stage {
        "start" => ApplyStage::Start,
        "progress" => ApplyStage::Progress,
        "done" => ApplyStage::Done,
        _ => return EventKind::Other,
    };
    EventKind::Apply { op, side, stage }
}
