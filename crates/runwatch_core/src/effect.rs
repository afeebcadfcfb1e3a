use crate::classifier::Block;
use crate::line_filter::RenderableLine;
use crate::{RunId, RunSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renderable {
    Block(Block),
    Line(RenderableLine),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Lanes or timeline changed.
    Render(RunSnapshot),
    /// Append to the run's scrollback.
    Append(Renderable),
    /// Whether a run is active, for enabling/disabling the start control.
    RunActive(bool),
    /// Fired once per run on verified completion.
    RefreshDownstream { run_id: RunId },
}
