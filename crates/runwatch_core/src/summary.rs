use std::collections::BTreeMap;

use serde_json::Value;

use crate::lanes::LaneDelta;
use crate::record::{number, SpotlightHints};
use crate::{Feature, RunId};

/// Coarse milestones the server records for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimelineFlags {
    pub start: bool,
    /// Pre-sync counts are known.
    pub pre: bool,
    /// Post-sync counts are known; the apply phase has run.
    pub post: bool,
    pub done: bool,
}

/// Run-summary document shared by the push stream's unnamed messages and the
/// poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub running: bool,
    pub exit_code: Option<i64>,
    pub run_id: Option<RunId>,
    pub lanes: BTreeMap<Feature, LaneDelta>,
    pub enabled: BTreeMap<Feature, bool>,
    pub flags: TimelineFlags,
}

impl RunSummary {
    pub fn from_json_str(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        // A summary always reports `running`; anything else is not one.
        let running = obj.get("running")?.as_bool().unwrap_or(false);

        let run_id = match obj.get("raw_started_ts") {
            Some(Value::Number(n)) => n.as_f64().map(|secs| RunId::issued(secs as i64)),
            _ => None,
        }
        .or_else(|| {
            obj.get("started_at")
                .and_then(Value::as_str)
                .and_then(RunId::parse)
        });

        let mut lanes = BTreeMap::new();
        if let Some(features) = obj.get("features").and_then(Value::as_object) {
            for (name, lane) in features {
                let (Some(feature), Some(lane)) = (Feature::parse(name), lane.as_object()) else {
                    continue;
                };
                lanes.insert(
                    feature,
                    LaneDelta {
                        added: number(lane.get("added")).unwrap_or(0),
                        removed: number(lane.get("removed")).unwrap_or(0),
                        updated: number(lane.get("updated")).unwrap_or(0),
                        spotlight: SpotlightHints::from_object(lane),
                        items: Vec::new(),
                    },
                );
            }
        }

        let mut enabled = BTreeMap::new();
        if let Some(flags) = obj.get("enabled").and_then(Value::as_object) {
            for (name, flag) in flags {
                if let (Some(feature), Some(flag)) = (Feature::parse(name), flag.as_bool()) {
                    enabled.insert(feature, flag);
                }
            }
        }

        let flags = obj
            .get("timeline")
            .and_then(Value::as_object)
            .map(|tl| {
                let flag = |key: &str| tl.get(key).and_then(Value::as_bool).unwrap_or(false);
                TimelineFlags {
                    start: flag("start"),
                    pre: flag("pre"),
                    post: flag("post"),
                    done: flag("done"),
                }
            })
            .unwrap_or_default();

        Some(Self {
            running,
            exit_code: obj.get("exit_code").and_then(Value::as_i64),
            run_id,
            lanes,
            enabled,
            flags,
        })
    }

    /// The run is over according to this document.
    pub fn reports_finished(&self) -> bool {
        !self.running || self.exit_code.is_some() || self.flags.done
    }
}

#[cfg(test)]
mod tests {
    use super::RunSummary;
    use crate::{Feature, RunId};

    #[test]
    fn parses_poll_document() {
        let summary = RunSummary::from_json_str(
            r#"{
                "running": true,
                "exit_code": null,
                "started_at": "2023-11-14T22:13:20Z",
                "features": {
                    "watchlist": {"added": 3, "removed": 1, "updated": 0,
                                  "spotlight_add": ["Alien", {"title": "Heat"}]},
                    "bogus": {"added": 9}
                },
                "enabled": {"watchlist": true, "ratings": false},
                "timeline": {"start": true, "pre": true, "post": false, "done": false}
            }"#,
        )
        .unwrap();
        assert!(summary.running);
        assert!(!summary.reports_finished());
        assert_eq!(summary.run_id, Some(RunId::issued(1_700_000_000)));
        let lane = &summary.lanes[&Feature::Watchlist];
        assert_eq!((lane.added, lane.removed), (3, 1));
        assert_eq!(lane.spotlight.add, vec!["Alien", "Heat"]);
        assert_eq!(summary.lanes.len(), 1);
        assert_eq!(summary.enabled.get(&Feature::Ratings), Some(&false));
        assert!(summary.flags.pre && !summary.flags.post);
    }

    #[test]
    fn documents_without_running_flag_are_rejected() {
        assert!(RunSummary::from_json_str(r#"{"event":"run:start"}"#).is_none());
    }
}
