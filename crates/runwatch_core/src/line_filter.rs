//! Ordered suppress/rewrite rules for free-text log lines.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::record::Record;
use crate::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Plain,
    Info,
    Warn,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableLine {
    pub text: String,
    pub level: LineLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filtered {
    Line(RenderableLine),
    /// The line was recognized and rewritten into a structured record.
    Record(Record),
    Dropped,
}

pub type Rewrite = fn(&Captures<'_>) -> Option<Record>;

#[derive(Debug, Clone, Copy)]
pub enum RuleAction {
    Drop,
    /// Drop the header and the next `follow` lines unconditionally.
    DropBlock { follow: usize },
    Rewrite(Rewrite),
    Level(LineLevel),
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub pattern: Regex,
    pub action: RuleAction,
}

impl Rule {
    pub fn new(name: &'static str, pattern: &str, action: RuleAction) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            action,
        })
    }
}

/// Default rule table, first match wins.
pub fn default_rules() -> Vec<Rule> {
    let table: [(&'static str, &str, RuleAction); 11] = [
        ("clear-marker", r"^::CLEAR::$", RuleAction::Drop),
        ("module-banner", r"^\[i\] Orchestrator module:", RuleAction::Drop),
        ("providers-banner", r"^\[i\] Providers:", RuleAction::Drop),
        (
            "feature-table",
            r"^\[i\] Features:\s*$",
            RuleAction::DropBlock {
                follow: crate::Feature::ALL.len(),
            },
        ),
        (
            "run-start",
            r"^(?:>\s*)?SYNC start:\s+(?P<cmd>.+)$",
            RuleAction::Rewrite(rewrite_start),
        ),
        (
            "run-totals",
            r"Done\. Total added:\s*(?P<added>\d+),\s*Total removed:\s*(?P<removed>\d+)",
            RuleAction::Rewrite(rewrite_totals),
        ),
        (
            "exit-code",
            r"^\[SYNC\]\s+exit code:\s+(?P<code>-?\d+)",
            RuleAction::Rewrite(rewrite_exit),
        ),
        (
            "sync-error",
            r"^\[!\]\s*Sync error:\s*(?P<msg>.*)$",
            RuleAction::Rewrite(rewrite_error),
        ),
        ("warn", r"^\[!\]", RuleAction::Level(LineLevel::Warn)),
        ("debug", r"^\[DEBUG\]", RuleAction::Level(LineLevel::Debug)),
        ("info", r"^\[i\]", RuleAction::Level(LineLevel::Info)),
    ];

    table
        .into_iter()
        .map(|(name, pattern, action)| Rule::new(name, pattern, action).expect("valid rule pattern"))
        .collect()
}

fn rewrite_start(caps: &Captures<'_>) -> Option<Record> {
    static RUN_ID: OnceLock<Regex> = OnceLock::new();
    let re = RUN_ID.get_or_init(|| Regex::new(r"run_id=(\d+)").expect("valid run id pattern"));
    let mut record = Record::new("run:start");
    record.message = caps.name("cmd").map(|m| m.as_str().trim().to_string());
    record.run_id = record
        .message
        .as_deref()
        .and_then(|cmd| re.captures(cmd))
        .and_then(|c| RunId::parse(&c[1]));
    Some(record)
}

fn rewrite_totals(caps: &Captures<'_>) -> Option<Record> {
    let mut record = Record::new("run:done");
    record.counts.added = Some(caps["added"].parse().ok()?);
    record.counts.removed = Some(caps["removed"].parse().ok()?);
    Some(record)
}

fn rewrite_exit(caps: &Captures<'_>) -> Option<Record> {
    let mut record = Record::new("run:exit");
    record.exit_code = Some(caps["code"].parse().ok()?);
    Some(record)
}

fn rewrite_error(caps: &Captures<'_>) -> Option<Record> {
    let mut record = Record::new("run:error");
    let msg = caps["msg"].trim();
    record.message = (!msg.is_empty()).then(|| msg.to_string());
    Some(record)
}

#[derive(Debug, Clone)]
pub struct LineFilter {
    rules: Vec<Rule>,
    squelch: usize,
}

impl PartialEq for LineFilter {
    fn eq(&self, other: &Self) -> bool {
        self.squelch == other.squelch
            && self.rules.len() == other.rules.len()
            && self
                .rules
                .iter()
                .zip(&other.rules)
                .all(|(a, b)| a.name == b.name && a.pattern.as_str() == b.pattern.as_str())
    }
}

impl Eq for LineFilter {}

impl Default for LineFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFilter {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules, squelch: 0 }
    }

    pub fn filter(&mut self, line: &str) -> Filtered {
        if self.squelch > 0 {
            self.squelch -= 1;
            return Filtered::Dropped;
        }

        let text = clean_line(line);
        if text.is_empty() {
            return Filtered::Dropped;
        }

        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(&text) else {
                continue;
            };
            return match rule.action {
                RuleAction::Drop => Filtered::Dropped,
                RuleAction::DropBlock { follow } => {
                    self.squelch = follow;
                    Filtered::Dropped
                }
                RuleAction::Rewrite(rewrite) => match rewrite(&caps) {
                    Some(record) => Filtered::Record(record),
                    None => Filtered::Line(RenderableLine {
                        text,
                        level: LineLevel::Plain,
                    }),
                },
                RuleAction::Level(level) => Filtered::Line(RenderableLine { text, level }),
            };
        }

        Filtered::Line(RenderableLine {
            text,
            level: LineLevel::Plain,
        })
    }

    pub fn reset(&mut self) {
        self.squelch = 0;
    }

    pub fn squelch_remaining(&self) -> usize {
        self.squelch
    }
}

/// Strips ANSI escapes, HTML tags and the common HTML entities.
pub fn clean_line(raw: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ansi pattern"));
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));

    let text = ansi.replace_all(raw, "");
    let text = tags.replace_all(&text, "");
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
