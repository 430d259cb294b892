/*!
 * Text segmentation into narration units.
 *
 * The segmenter turns marked-up text into an ordered sequence of `TextUnit`s:
 * - markers always become standalone units
 * - sentence terminator runs (`.`, `?`, `!`) and newlines close a unit
 * - decimal numbers such as `3.14` never close a unit
 * - blank lines are not units; they are kept as a trailing newline on the
 *   previous speakable unit so the player can reproduce paragraph breaks
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::markers::{Marker, TokenMasker};

/// Unit boundaries: a marker, a terminator run, or a newline
static BOUNDARY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[PAGE:\d+\]|\[IMG:.*?\]|[.?!]+|\n").expect("Invalid boundary regex")
});

/// Decimal numbers whose points must not act as terminators
static DECIMAL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+(?:\.\d+)+").expect("Invalid decimal regex")
});

static TERMINATOR_RUN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[.?!]+$").expect("Invalid terminator regex")
});

/// What a unit represents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum UnitKind {
    /// Prose that is sent to the speech provider
    Speakable,
    /// A `[PAGE:n]` marker
    PageTrigger(u32),
    /// An `[IMG:path]` marker
    ImageMarker(String),
}

/// One ordered unit of the narration. Its index is its position, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextUnit {
    pub index: usize,
    pub raw_text: String,
    pub kind: UnitKind,
}

impl TextUnit {
    /// Whether this unit goes to the speech provider
    pub fn is_speakable(&self) -> bool {
        self.kind == UnitKind::Speakable
    }

    /// The text actually sent for synthesis (layout whitespace removed)
    pub fn speech_text(&self) -> &str {
        self.raw_text.trim()
    }

    /// A speakable unit made only of punctuation produces no speech
    pub fn is_punctuation_only(&self) -> bool {
        self.is_speakable() && !self.raw_text.chars().any(char::is_alphanumeric)
    }
}

/// Splits raw text into `TextUnit`s
#[derive(Debug, Default, Clone, Copy)]
pub struct TextSegmenter;

impl TextSegmenter {
    pub fn new() -> Self {
        Self
    }

    /// Segment text into ordered units. Never fails: malformed markers are prose.
    pub fn segment(&self, text: &str) -> Vec<TextUnit> {
        let protected = TokenMasker::new(DECIMAL_REGEX.clone()).mask(text);
        let mut builder = UnitBuilder::default();

        let mut last_end = 0;
        for boundary in BOUNDARY_REGEX.find_iter(&protected.text) {
            if boundary.start() > last_end {
                builder.push_text(&protected.text[last_end..boundary.start()]);
            }
            builder.push_boundary(boundary.as_str(), &protected.unmask(boundary.as_str()));
            last_end = boundary.end();
        }
        if last_end < protected.text.len() {
            builder.push_text(&protected.text[last_end..]);
        }

        let units = builder.finish(|raw| protected.unmask(raw));
        debug!("Segmented {} chars into {} units", text.chars().count(), units.len());
        units
    }
}

/// Accumulates parts into units while walking the boundary matches
#[derive(Default)]
struct UnitBuilder {
    pending: Vec<PendingUnit>,
    buffer: String,
}

enum PendingUnit {
    Text(String),
    Marker(String, Marker),
}

impl UnitBuilder {
    fn push_text(&mut self, part: &str) {
        self.buffer.push_str(part);
    }

    fn push_boundary(&mut self, part: &str, unmasked: &str) {
        if let Some(marker) = Marker::parse(unmasked) {
            self.flush();
            // whitespace left before a marker carries no layout
            self.buffer.clear();
            self.pending.push(PendingUnit::Marker(unmasked.to_string(), marker));
            return;
        }

        self.buffer.push_str(part);
        let is_newline = part == "\n";
        if !is_newline && !TERMINATOR_RUN_REGEX.is_match(part) {
            return;
        }

        if !self.flush() && is_newline {
            if let Some(PendingUnit::Text(previous)) = self.pending.last_mut() {
                previous.push('\n');
            }
            self.buffer.clear();
        }
    }

    /// Emit the buffer as a unit if it has content. Returns whether it did.
    fn flush(&mut self) -> bool {
        if self.buffer.trim().is_empty() {
            return false;
        }
        let text = self.buffer.trim_start().to_string();
        self.pending.push(PendingUnit::Text(text));
        self.buffer.clear();
        true
    }

    fn finish<F>(mut self, restore: F) -> Vec<TextUnit>
    where
        F: Fn(&str) -> String,
    {
        self.flush();
        self.pending
            .into_iter()
            .enumerate()
            .map(|(index, pending)| match pending {
                PendingUnit::Text(text) => TextUnit {
                    index,
                    raw_text: restore(&text),
                    kind: UnitKind::Speakable,
                },
                PendingUnit::Marker(text, Marker::Page(page)) => TextUnit {
                    index,
                    raw_text: text,
                    kind: UnitKind::PageTrigger(page),
                },
                PendingUnit::Marker(text, Marker::Image(path)) => TextUnit {
                    index,
                    raw_text: text,
                    kind: UnitKind::ImageMarker(path),
                },
            })
            .collect()
    }
}
