//! Runwatch core: the pure run-telemetry pipeline.
//!
//! Raw channel input goes in as [`Msg`]s; [`update`] returns the next state
//! and the [`Effect`]s the host should carry out.
pub mod classifier;
mod effect;
pub mod event_kind;
pub mod lanes;
pub mod line_filter;
mod msg;
pub mod record;
pub mod replay;
mod run_id;
pub mod spotlight;
mod state;
mod summary;
pub mod timeline;
pub mod tokenizer;
mod types;
mod update;
mod view_model;

pub use classifier::{ApplyTally, Block, EventClassifier};
pub use effect::{Effect, Renderable};
pub use event_kind::{ApplyOp, ApplyStage, EventKind, Side};
pub use lanes::{CumulativeTotals, LaneAggregator, LaneDelta, LaneStats, MergeResult, Verdict};
pub use line_filter::{Filtered, LineFilter, LineLevel, RenderableLine};
pub use msg::Msg;
pub use record::{Counts, Item, Record, SpotlightHints};
pub use replay::ReplayGuard;
pub use run_id::{Observation, RunId, RunTracker};
pub use state::RunState;
pub use summary::{RunSummary, TimelineFlags};
pub use timeline::{Phase, RunTimeline, Signal, SubPhase, TimelineCoordinator, Transition};
pub use tokenizer::{ChunkTokenizer, Token, Tokenized};
pub use types::{ChannelKind, Feature, PipelineSettings, Timestamp};
pub use update::update;
pub use view_model::{LaneTotals, RunSnapshot};
