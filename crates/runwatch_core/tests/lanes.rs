use runwatch_core::{Feature, Item, LaneAggregator, LaneDelta, SpotlightHints, Verdict};

fn added(n: u64) -> LaneDelta {
    LaneDelta {
        added: n,
        ..LaneDelta::default()
    }
}

#[test]
fn zero_update_while_running_keeps_previous_stats() {
    let mut lanes = LaneAggregator::new();
    lanes.merge(Feature::Watchlist, added(5), 10, true);

    let result = lanes.merge(Feature::Watchlist, LaneDelta::default(), 20, true);
    assert_eq!(result.verdict, Verdict::RejectedZeroWipe);
    assert_eq!(result.stats.added, 5);
    assert_eq!(lanes.get(Feature::Watchlist).map(|l| l.last_update_ts), Some(10));
}

#[test]
fn zero_update_after_run_is_accepted_but_counters_hold() {
    let mut lanes = LaneAggregator::new();
    lanes.merge(Feature::Watchlist, added(5), 10, true);

    let result = lanes.merge(Feature::Watchlist, LaneDelta::default(), 20, false);
    assert_eq!(result.verdict, Verdict::Accepted);
    assert!(!result.changed);
    assert_eq!(result.stats.added, 5);
    assert_eq!(result.stats.last_update_ts, 20);
}

#[test]
fn older_update_is_rejected_regardless_of_values() {
    let mut lanes = LaneAggregator::new();
    lanes.merge(Feature::Ratings, added(1), 100, true);

    let result = lanes.merge(Feature::Ratings, added(50), 50, true);
    assert_eq!(result.verdict, Verdict::RejectedStale);
    assert_eq!(result.stats.added, 1);
}

#[test]
fn counters_never_decrease_within_a_run() {
    let mut lanes = LaneAggregator::new();
    let mut last = 0;
    for (ts, n) in [(1, 2), (2, 7), (3, 4), (4, 7), (5, 9), (6, 1)] {
        let stats = lanes.merge(Feature::History, added(n), ts, true).stats;
        assert!(stats.added >= last);
        last = stats.added;
    }
    assert_eq!(last, 9);
}

#[test]
fn untracked_lane_with_zero_totals_is_not_created() {
    let mut lanes = LaneAggregator::new();
    let result = lanes.merge(Feature::Playlists, LaneDelta::default(), 1, true);
    assert_eq!(result.verdict, Verdict::Ignored);
    assert!(lanes.get(Feature::Playlists).is_none());
}

#[test]
fn spotlight_prefers_explicit_hints_and_caps_at_three() {
    let mut lanes = LaneAggregator::new();
    let explicit = LaneDelta {
        added: 4,
        spotlight: SpotlightHints {
            add: vec!["A".into(), "B".into()],
            ..SpotlightHints::default()
        },
        items: vec![Item::titled("ignored")],
        ..LaneDelta::default()
    };
    lanes.merge(Feature::Watchlist, explicit, 1, true);

    let synthesized = LaneDelta {
        added: 6,
        items: ["B", "C", "D"].into_iter().map(Item::titled).collect(),
        ..LaneDelta::default()
    };
    let stats = lanes.merge(Feature::Watchlist, synthesized, 2, true).stats;
    assert_eq!(stats.spotlight_add, vec!["A", "B", "C"]);
}

#[test]
fn history_items_with_watched_marker_are_additions() {
    let mut lanes = LaneAggregator::new();
    let delta = LaneDelta {
        added: 1,
        removed: 1,
        items: vec![
            Item {
                title: "Heat".into(),
                action: None,
                watched: true,
            },
            Item {
                title: "Alien".into(),
                action: Some("unwatch".into()),
                watched: false,
            },
        ],
        ..LaneDelta::default()
    };
    let stats = lanes.merge(Feature::History, delta, 1, true).stats;
    assert_eq!(stats.spotlight_add, vec!["Heat"]);
    assert_eq!(stats.spotlight_remove, vec!["Alien"]);
}
