use std::fmt;

use chrono::DateTime;

use crate::Timestamp;

/// Identifies one run by its start stamp in epoch seconds.
///
/// Provisional ids are minted locally (optimistic start, or a start record that
/// carried no id) and are replaced by the server-issued id once one is seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId {
    started: i64,
    provisional: bool,
}

impl RunId {
    pub fn issued(started_secs: i64) -> Self {
        Self {
            started: started_secs,
            provisional: false,
        }
    }

    pub fn provisional(at: Timestamp) -> Self {
        Self {
            started: (at / 1000) as i64,
            provisional: true,
        }
    }

    /// Parses epoch seconds (`"1700000000"`, `"1700000000.25"`) or an RFC 3339 stamp.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(secs) = raw.parse::<i64>() {
            return (secs > 0).then(|| Self::issued(secs));
        }
        if let Ok(secs) = raw.parse::<f64>() {
            return (secs > 0.0).then(|| Self::issued(secs as i64));
        }
        let normalized = raw.replace('Z', "+00:00");
        DateTime::parse_from_rfc3339(&normalized)
            .ok()
            .map(|dt| Self::issued(dt.timestamp()))
    }

    pub fn started(&self) -> i64 {
        self.started
    }

    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    pub fn same_run(&self, other: &RunId, skew_secs: i64) -> bool {
        (self.started - other.started).abs() <= skew_secs
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.provisional {
            write!(f, "local-{}", self.started)
        } else {
            write!(f, "{}", self.started)
        }
    }
}

/// What observing a run id means for per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Same run as the one tracked.
    Same,
    /// The provisional id was replaced by the issued one; state is kept.
    Adopted,
    /// A different, newer run: per-run state must be reset.
    NewRun,
    /// An older or already-finished run replayed by a channel; ignore.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTracker {
    current: Option<RunId>,
    last_completed: Option<RunId>,
    skew_secs: i64,
    adopt_window_secs: i64,
}

impl RunTracker {
    pub fn new(skew_secs: i64, adopt_window_secs: i64) -> Self {
        Self {
            current: None,
            last_completed: None,
            skew_secs,
            adopt_window_secs,
        }
    }

    pub fn current(&self) -> Option<RunId> {
        self.current
    }

    pub fn skew_secs(&self) -> i64 {
        self.skew_secs
    }

    /// Starts tracking `id` unconditionally (explicit user start).
    pub fn begin(&mut self, id: RunId) {
        self.current = Some(id);
    }

    /// `active` is whether the timeline is in `Init` or `Running`.
    pub fn observe(&mut self, id: RunId, active: bool) -> Observation {
        let Some(cur) = self.current else {
            self.current = Some(id);
            return Observation::NewRun;
        };

        if cur.same_run(&id, self.skew_secs) {
            if cur.provisional && !id.provisional {
                self.current = Some(id);
                return Observation::Adopted;
            }
            return Observation::Same;
        }

        if !id.provisional && self.is_completed(&id) {
            return Observation::Stale;
        }

        if cur.provisional && !id.provisional && active {
            if id.started >= cur.started - self.adopt_window_secs {
                self.current = Some(id);
                return Observation::Adopted;
            }
            return Observation::Stale;
        }

        if id.started < cur.started - self.skew_secs {
            return Observation::Stale;
        }

        self.current = Some(id);
        Observation::NewRun
    }

    pub fn mark_completed(&mut self) {
        if let Some(cur) = self.current {
            self.last_completed = Some(cur);
        }
    }

    pub fn is_completed(&self, id: &RunId) -> bool {
        self.last_completed
            .is_some_and(|done| !done.provisional && done.same_run(id, self.skew_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::{Observation, RunId, RunTracker};

    #[test]
    fn parses_epoch_and_rfc3339() {
        assert_eq!(RunId::parse("1700000000"), Some(RunId::issued(1_700_000_000)));
        assert_eq!(
            RunId::parse("2023-11-14T22:13:20Z"),
            Some(RunId::issued(1_700_000_000))
        );
        assert_eq!(RunId::parse("soon"), None);
    }

    #[test]
    fn provisional_id_is_adopted_while_active() {
        let mut tracker = RunTracker::new(5, 120);
        assert_eq!(
            tracker.observe(RunId::provisional(1_700_000_010_000), true),
            Observation::NewRun
        );
        assert_eq!(
            tracker.observe(RunId::issued(1_700_000_000), true),
            Observation::Adopted
        );
        assert_eq!(tracker.current(), Some(RunId::issued(1_700_000_000)));
    }

    #[test]
    fn older_run_is_stale() {
        let mut tracker = RunTracker::new(5, 120);
        tracker.observe(RunId::issued(2_000), false);
        assert_eq!(tracker.observe(RunId::issued(1_000), false), Observation::Stale);
        assert_eq!(tracker.observe(RunId::issued(3_000), false), Observation::NewRun);
    }

    #[test]
    fn completed_run_is_not_adopted_by_a_new_click() {
        let mut tracker = RunTracker::new(5, 120);
        tracker.observe(RunId::issued(1_000), true);
        tracker.mark_completed();
        tracker.observe(RunId::provisional(1_030_000), true);
        assert_eq!(tracker.observe(RunId::issued(1_000), true), Observation::Stale);
    }
}
