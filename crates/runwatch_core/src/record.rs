//! Canonical record type and the normalization step at the parse boundary.
//!
//! Producers disagree on payload shapes (`result.count` vs `count`, titles as
//! strings or objects, `feature` vs `feat`). Everything downstream of
//! [`Record::from_value`] only sees the canonical form.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

use crate::event_kind::EventKind;
use crate::{Feature, RunId};

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Counts {
    pub count: Option<u64>,
    pub done: Option<u64>,
    pub total: Option<u64>,
    pub added: Option<u64>,
    pub removed: Option<u64>,
    pub updated: Option<u64>,
    pub effective: Option<u64>,
    pub pairs: Option<u64>,
}

/// One underlying media item referenced by a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item {
    pub title: String,
    /// Lowercased action-like field (`action`, `op` or `change`).
    pub action: Option<String>,
    /// The item carries a watched/scrobble marker.
    pub watched: bool,
}

impl Item {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            action: None,
            watched: false,
        }
    }
}

/// Titles the producer explicitly marked as add/remove/update examples.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct SpotlightHints {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub update: Vec<String>,
}

impl SpotlightHints {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }

    pub(crate) fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            add: titles(obj.get("spotlight_add")),
            remove: titles(obj.get("spotlight_remove")),
            update: titles(obj.get("spotlight_update")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Record {
    pub kind: String,
    pub feature: Option<Feature>,
    pub counts: Counts,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub items: Vec<Item>,
    pub spotlight: SpotlightHints,
    /// `(i, n)` pair ordinal from `run:pair`.
    pub ordinal: Option<(u64, u64)>,
    pub message: Option<String>,
    pub action: Option<String>,
    pub exit_code: Option<i64>,
    pub run_id: Option<RunId>,
    pub dry_run: bool,
}

impl Record {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Parses a structured token. Anything that is not a JSON object with an
    /// `event` tag is discarded.
    pub fn from_json_str(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Self::from_value(&value, None)
    }

    /// `fallback_kind` is used when the object has no `event` tag (for example
    /// when the push stream carries the tag in the SSE event name instead).
    pub fn from_value(value: &Value, fallback_kind: Option<&str>) -> Option<Self> {
        let obj = value.as_object()?;
        let kind = obj
            .get("event")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or(fallback_kind)?
            .to_string();

        let result = obj.get("result").and_then(Value::as_object);
        let result_count = result.and_then(|r| number(r.get("count")));
        let count = result_count.or_else(|| number(obj.get("count")));

        let counts = Counts {
            count,
            done: number(obj.get("done")).or(count),
            total: number(obj.get("total")).or_else(|| number(obj.get("count"))),
            added: number(obj.get("added")),
            removed: number(obj.get("removed")),
            updated: number(obj.get("updated")),
            effective: number(obj.get("effective")),
            pairs: number(obj.get("pairs")),
        };

        let feature = text(obj.get("feature"))
            .or_else(|| text(obj.get("feat")))
            .and_then(|f| Feature::parse(&f));

        let items = obj
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(item).collect())
            .unwrap_or_default();

        let mut spotlight = SpotlightHints::from_object(obj);
        if spotlight.is_empty() {
            if let Some(spot) = obj.get("spotlight").and_then(Value::as_object) {
                spotlight = SpotlightHints::from_object(spot);
            }
        }

        let ordinal = match (number(obj.get("i")), number(obj.get("n"))) {
            (Some(i), Some(n)) => Some((i, n)),
            _ => None,
        };

        let run_id = text(obj.get("run_id")).and_then(|raw| RunId::parse(&raw));
        let message = text(obj.get("msg"))
            .or_else(|| text(obj.get("error")))
            .or_else(|| text(obj.get("reason")));

        Some(Self {
            kind,
            feature,
            counts,
            src: text(obj.get("src")).or_else(|| text(obj.get("a"))),
            dst: text(obj.get("dst"))
                .or_else(|| text(obj.get("provider")))
                .or_else(|| text(obj.get("b"))),
            items,
            spotlight,
            ordinal,
            message,
            action: text(obj.get("action")).map(|a| a.to_ascii_lowercase()),
            exit_code: obj.get("exit_code").and_then(Value::as_i64),
            run_id,
            dry_run: obj.get("dry_run").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    pub fn event(&self) -> EventKind {
        EventKind::parse(&self.kind, self.message.as_deref())
    }

    /// Stable content hash used to recognize the same logical record across channels.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

pub(crate) fn number(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_TITLE_CHARS).collect())
}

fn item(value: &Value) -> Option<Item> {
    match value {
        Value::String(s) => truncate_title(s).map(Item::titled),
        Value::Object(obj) => {
            let title = ["title", "name", "key"]
                .iter()
                .find_map(|k| text(obj.get(*k)))
                .and_then(|t| truncate_title(&t))?;
            let action = ["action", "op", "change"]
                .iter()
                .find_map(|k| text(obj.get(*k)))
                .map(|a| a.to_ascii_lowercase().replace([':', '-'], "_"));
            let watched = ["watched_at", "watched", "last_watched_at", "scrobbled"]
                .iter()
                .any(|k| obj.get(*k).is_some_and(|v| !v.is_null() && v != &Value::Bool(false)));
            Some(Item {
                title,
                action,
                watched,
            })
        }
        _ => None,
    }
}

pub(crate) fn titles(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(item)
                .map(|item| item.title)
                .collect()
        })
        .unwrap_or_default()
}
