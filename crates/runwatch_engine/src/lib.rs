//! Runwatch engine: the IO side of the telemetry pipeline.
mod engine;
mod poll;
mod settings;
mod source;
pub mod sse;
mod supervisor;
mod trigger;
mod types;

pub use engine::{NoHooks, RunHooks, TelemetryHandle};
pub use poll::fetch_summary;
pub use settings::{Endpoints, SupervisorSettings};
pub use source::{ByteStream, ReqwestSource, StreamSource};
pub use trigger::trigger_run;
pub use types::{now_ms, ChannelError, FailureKind, TriggerError, TriggerOutcome};
