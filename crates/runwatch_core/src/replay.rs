use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::ChannelKind;

/// Admits each logical update at most once per run across all channels.
///
/// A channel counts how often it has delivered a given fingerprint; the n-th
/// occurrence on any channel is the same logical update as the n-th occurrence
/// on another. Resetting a channel's counters on reconnect makes a full replay
/// of its buffer collide with what was already admitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayGuard {
    ordinals: HashMap<(ChannelKind, u64), u32>,
    admitted: HashSet<(u64, u32)>,
    /// Connections that delivered a record of the already-finished run.
    finished_replays: HashSet<ChannelKind>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&mut self, channel: ChannelKind, fingerprint: u64) -> bool {
        let ordinal = self.ordinals.entry((channel, fingerprint)).or_insert(0);
        *ordinal += 1;
        self.admitted.insert((fingerprint, *ordinal))
    }

    pub fn reset_channel(&mut self, channel: ChannelKind) {
        self.ordinals.retain(|(kind, _), _| *kind != channel);
        self.finished_replays.remove(&channel);
    }

    /// The channel's current connection is replaying the finished run. Holds
    /// until the channel reconnects or a new run is tracked.
    pub fn mark_finished_run(&mut self, channel: ChannelKind) {
        self.finished_replays.insert(channel);
    }

    pub fn replays_finished_run(&self, channel: ChannelKind) -> bool {
        self.finished_replays.contains(&channel)
    }

    pub fn clear(&mut self) {
        self.ordinals.clear();
        self.admitted.clear();
        self.finished_replays.clear();
    }
}

/// Fingerprint for a free-text line.
pub fn line_fingerprint(line: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    "line".hash(&mut hasher);
    line.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_channel_copy_is_rejected_but_repeats_are_not() {
        let mut guard = ReplayGuard::new();
        assert!(guard.admit(ChannelKind::Push, 7));
        assert!(guard.admit(ChannelKind::Push, 7));
        assert!(!guard.admit(ChannelKind::Log, 7));
        assert!(!guard.admit(ChannelKind::Log, 7));
        // A third occurrence has no counterpart yet.
        assert!(guard.admit(ChannelKind::Log, 7));
    }

    #[test]
    fn reconnect_replay_is_rejected() {
        let mut guard = ReplayGuard::new();
        assert!(guard.admit(ChannelKind::Log, 1));
        assert!(guard.admit(ChannelKind::Log, 2));
        guard.reset_channel(ChannelKind::Log);
        assert!(!guard.admit(ChannelKind::Log, 1));
        assert!(!guard.admit(ChannelKind::Log, 2));
        assert!(guard.admit(ChannelKind::Log, 3));
    }

    #[test]
    fn finished_run_mark_lasts_until_reconnect() {
        let mut guard = ReplayGuard::new();
        guard.mark_finished_run(ChannelKind::Log);
        assert!(guard.replays_finished_run(ChannelKind::Log));
        assert!(!guard.replays_finished_run(ChannelKind::Push));
        guard.reset_channel(ChannelKind::Log);
        assert!(!guard.replays_finished_run(ChannelKind::Log));
    }
}
