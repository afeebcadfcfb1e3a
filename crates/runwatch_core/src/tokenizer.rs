//! Splits an append-only, chunk-fragmented text stream into structured
//! records (balanced `{...}` spans) and free-text lines.

use std::sync::OnceLock;

use regex::Regex;

/// An open record longer than this is given up on and emitted as free text,
/// so a stray `{` in a banner cannot hold the buffer forever.
pub const MAX_RECORD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A complete brace-balanced span, not yet parsed.
    Record(String),
    /// One free-text line, trimmed and non-empty.
    Line(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    /// Unconsumed remainder to pass back in with the next chunk.
    pub buffer: String,
}

/// Tokenizes `buffer + chunk`.
///
/// Free text is only emitted once it is terminated by a newline or by the
/// start of a record; anything else stays in the returned buffer.
pub fn process(buffer: &str, chunk: &str) -> Tokenized {
    let mut text = String::with_capacity(buffer.len() + chunk.len());
    text.push_str(buffer);
    text.push_str(chunk);

    let mut tokens = Vec::new();
    let mut scan = Scan::default();
    let mut text_start = 0usize;
    let mut record_start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        match record_start {
            None => match ch {
                '{' => {
                    push_lines(&mut tokens, &text[text_start..idx]);
                    record_start = Some(idx);
                    scan = Scan {
                        depth: 1,
                        ..Scan::default()
                    };
                }
                '\n' => {
                    push_lines(&mut tokens, &text[text_start..idx]);
                    text_start = idx + 1;
                }
                _ => {}
            },
            Some(start) => {
                if scan.step(ch) {
                    let end = idx + ch.len_utf8();
                    tokens.push(Token::Record(text[start..end].to_string()));
                    record_start = None;
                    text_start = end;
                } else if idx - start > MAX_RECORD_BYTES {
                    // Not a record after all: treat the span as plain text.
                    record_start = None;
                    text_start = start;
                }
            }
        }
    }

    let rest = match record_start {
        Some(start) => &text[start..],
        None => &text[text_start..],
    };
    Tokenized {
        tokens,
        buffer: rest.to_string(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    depth: usize,
    in_string: bool,
    escape: bool,
}

impl Scan {
    /// Advances over one character inside a record; `true` once depth returns to zero.
    fn step(&mut self, ch: char) -> bool {
        if self.in_string {
            if self.escape {
                self.escape = false;
            } else if ch == '\\' {
                self.escape = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return false;
        }
        match ch {
            '"' => self.in_string = true,
            '{' => self.depth += 1,
            '}' => {
                self.depth = self.depth.saturating_sub(1);
                return self.depth == 0;
            }
            _ => {}
        }
        false
    }
}

fn line_starts() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?:i|!|DEBUG|SYNC)\] |(?:> )?SYNC start:").expect("valid line-start pattern")
    })
}

/// Splits free text on known line starts, since some producers glue
/// consecutive messages together without a line break.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut cuts: Vec<usize> = line_starts()
        .find_iter(text)
        .map(|m| m.start())
        .filter(|&pos| pos > 0)
        .collect();
    cuts.push(text.len());

    let mut pieces = Vec::with_capacity(cuts.len());
    let mut from = 0;
    for cut in cuts {
        let piece = text[from..cut].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        from = cut;
    }
    pieces
}

fn push_lines(tokens: &mut Vec<Token>, text: &str) {
    for raw in text.split('\n') {
        for line in split_lines(raw) {
            tokens.push(Token::Line(line.to_string()));
        }
    }
}

/// Stateful wrapper that owns the carry-over buffer between chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkTokenizer {
    buffer: String,
}

impl ChunkTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Token> {
        let out = process(&self.buffer, chunk);
        self.buffer = out.buffer;
        out.tokens
    }

    /// End of stream: flushes trailing free text and discards an unbalanced record.
    pub fn finish(&mut self) -> Vec<Token> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.starts_with('{') {
            return Vec::new();
        }
        let mut tokens = Vec::new();
        push_lines(&mut tokens, &rest);
        tokens
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }
}
