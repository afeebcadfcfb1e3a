//! Sorting items into add/remove/update samples when the producer did not
//! say which is which.

use crate::event_kind::ApplyOp;
use crate::record::{Item, SpotlightHints};
use crate::Feature;

pub const SPOTLIGHT_LIMIT: usize = 3;

fn any_in(action: &str, tokens: &[&str]) -> bool {
    tokens.iter().any(|t| action.contains(t))
}

/// Decides which list an item belongs to. `fallback` is the operation of the
/// record that carried the item, used when the item has no action field.
pub fn classify_item(feature: Feature, item: &Item, fallback: Option<ApplyOp>) -> ApplyOp {
    let Some(action) = item.action.as_deref() else {
        if feature == Feature::History && item.watched {
            return ApplyOp::Add;
        }
        return fallback.unwrap_or(match feature {
            Feature::Ratings => ApplyOp::Update,
            _ => ApplyOp::Add,
        });
    };

    match feature {
        Feature::Watchlist => {
            if any_in(action, &["remove", "unwatchlist", "delete", "del", "rm", "clear"]) {
                ApplyOp::Remove
            } else {
                ApplyOp::Add
            }
        }
        Feature::Ratings => {
            if any_in(action, &["remove", "unrate", "delete", "clear"]) {
                ApplyOp::Remove
            } else if any_in(action, &["update", "rate"]) {
                ApplyOp::Update
            } else {
                ApplyOp::Add
            }
        }
        Feature::History => {
            // "unwatch" contains "watch", so removals are tested first.
            if any_in(
                action,
                &["unwatch", "remove", "delete_watch", "del_history", "history_remove"],
            ) {
                ApplyOp::Remove
            } else if item.watched
                || any_in(
                    action,
                    &["watch", "scrobble", "checkin", "history_add", "add_history", "add"],
                )
            {
                ApplyOp::Add
            } else {
                ApplyOp::Update
            }
        }
        Feature::Playlists => {
            if any_in(action, &["remove", "delete", "rm", "del"]) {
                ApplyOp::Remove
            } else if any_in(action, &["update", "rename", "move", "reorder"]) {
                ApplyOp::Update
            } else {
                ApplyOp::Add
            }
        }
    }
}

/// Builds spotlight hints from raw items.
pub fn synthesize(feature: Feature, items: &[Item], fallback: Option<ApplyOp>) -> SpotlightHints {
    let mut hints = SpotlightHints::default();
    for item in items {
        let list = match classify_item(feature, item, fallback) {
            ApplyOp::Add => &mut hints.add,
            ApplyOp::Remove => &mut hints.remove,
            ApplyOp::Update => &mut hints.update,
        };
        list.push(item.title.clone());
    }
    hints
}

/// Appends unseen titles in order until the list holds [`SPOTLIGHT_LIMIT`] entries.
pub fn extend_unique(list: &mut Vec<String>, titles: &[String]) -> bool {
    let before = list.len();
    for title in titles {
        if list.len() >= SPOTLIGHT_LIMIT {
            break;
        }
        if !list.iter().any(|t| t == title) {
            list.push(title.clone());
        }
    }
    list.len() != before
}
