use crate::{ChannelKind, RunId, RunSummary, Timestamp};

/// Inputs to [`crate::update`]. Every message carries the time it was
/// received (`at`, epoch milliseconds); the core never reads a clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User pressed start; the run is tracked before the server confirms it.
    StartClicked { at: Timestamp },
    /// The trigger endpoint accepted the run and issued an id.
    RunAccepted { run_id: RunId, at: Timestamp },
    /// A channel (re)connected; its replay counters start over.
    ChannelOpened { channel: ChannelKind, at: Timestamp },
    /// A channel dropped or was force-closed.
    ChannelLost { channel: ChannelKind, at: Timestamp },
    /// One frame from the run-summary push stream. `name` is the SSE event
    /// name, `None` for unnamed summary snapshots.
    PushEvent {
        name: Option<String>,
        data: String,
        at: Timestamp,
    },
    /// Raw text from the log-tail stream, in arbitrary-sized pieces.
    LogChunk { text: String, at: Timestamp },
    /// A parsed run-summary document; `at` is when the request was sent.
    Summary {
        channel: ChannelKind,
        summary: RunSummary,
        at: Timestamp,
    },
    /// Drift timer.
    Tick { at: Timestamp },
    /// Drop everything and return to idle.
    Reset,
    NoOp,
}
