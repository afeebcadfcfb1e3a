use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, stamped by the channel that received an update.
pub type Timestamp = u64;

/// A lane: one feature track whose statistics are kept independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Watchlist,
    Ratings,
    History,
    Playlists,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Watchlist,
        Feature::Ratings,
        Feature::History,
        Feature::Playlists,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "watchlist" => Some(Feature::Watchlist),
            "ratings" | "rating" => Some(Feature::Ratings),
            "history" | "watched" => Some(Feature::History),
            "playlists" | "playlist" => Some(Feature::Playlists),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Watchlist => "watchlist",
            Feature::Ratings => "ratings",
            Feature::History => "history",
            Feature::Playlists => "playlists",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the independent update sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelKind {
    /// Server-push run-summary events.
    Push,
    /// Server-push raw log tail.
    Log,
    /// Periodic run-summary fetch.
    Poll,
}

impl ChannelKind {
    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Push => "push",
            ChannelKind::Log => "log",
            ChannelKind::Poll => "poll",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tunables for the pure pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// How long an optimistic start ignores a poll that still reports `running=false`.
    pub start_grace_ms: u64,
    /// Percentage points added per tick while a phase reports no counters.
    pub drift_step: u8,
    /// Issued run ids closer than this are the same run.
    pub run_id_skew_secs: i64,
    /// How far an issued id may predate a provisional one and still be adopted.
    pub adopt_window_secs: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            start_grace_ms: 10_000,
            drift_step: 1,
            run_id_skew_secs: 5,
            adopt_window_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Feature;

    #[test]
    fn feature_parse_accepts_singular_aliases() {
        assert_eq!(Feature::parse("Ratings"), Some(Feature::Ratings));
        assert_eq!(Feature::parse("playlist"), Some(Feature::Playlists));
        assert_eq!(Feature::parse("watchlist,ratings"), None);
    }
}
