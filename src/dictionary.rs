/*!
 * Personal pronunciation dictionary.
 *
 * Entries map an undiacritized key to the diacritized form the user wants.
 * The overlay is applied longest key first, and each key matches both bare
 * and already-vocalized occurrences of its letters.
 *
 * On disk the dictionary is a JSON object keyed by the undiacritized word:
 *
 * ```json
 * { "שלום": { "value": "שָׁלוֹם", "match_type": "exact", "date": "2024-05-01" } }
 * ```
 *
 * A bare string value (`{ "שלום": "שָׁלוֹם" }`) is accepted as a partial entry.
 */

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::markers::TokenMasker;
use crate::text_tools::{is_word_char, remove_nikud};

/// How a dictionary key is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Whole words only
    Exact,
    /// Anywhere, including inside longer words
    #[default]
    Partial,
}

/// One dictionary entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PronunciationEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub date: String,
}

impl PronunciationEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            match_type,
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Plain(String),
    Full {
        value: String,
        #[serde(default)]
        match_type: MatchType,
        #[serde(default)]
        date: String,
    },
}

#[derive(Debug, Serialize)]
struct StoredEntryOut<'a> {
    value: &'a str,
    match_type: MatchType,
    date: &'a str,
}

/// Read-only snapshot of the pronunciation dictionary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    entries: Vec<PronunciationEntry>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PronunciationEntry>) -> Self {
        let mut dictionary = Self::new();
        for entry in entries {
            dictionary.insert(entry);
        }
        dictionary
    }

    /// Add or replace the entry for a key
    pub fn insert(&mut self, entry: PronunciationEntry) {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PronunciationEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn entries(&self) -> &[PronunciationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the JSON dictionary format
    pub fn from_json_str(json: &str) -> Result<Self> {
        let stored: BTreeMap<String, StoredEntry> =
            serde_json::from_str(json).context("Failed to parse dictionary JSON")?;

        Ok(Self::from_entries(stored.into_iter().map(|(key, stored)| match stored {
            StoredEntry::Plain(value) => PronunciationEntry {
                key,
                value,
                match_type: MatchType::Partial,
                date: String::new(),
            },
            StoredEntry::Full { value, match_type, date } => PronunciationEntry {
                key,
                value,
                match_type,
                date,
            },
        })))
    }

    /// Load a dictionary file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary file: {}", path.display()))?;
        Self::from_json_str(&json)
    }

    /// Serialize to the JSON dictionary format
    pub fn to_json_string(&self) -> Result<String> {
        let stored: BTreeMap<&str, StoredEntryOut<'_>> = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.key.as_str(),
                    StoredEntryOut {
                        value: &e.value,
                        match_type: e.match_type,
                        date: &e.date,
                    },
                )
            })
            .collect();
        serde_json::to_string_pretty(&stored).context("Failed to serialize dictionary")
    }

    /// Compile the overlay for this snapshot
    pub fn overlay(&self) -> DictionaryOverlay {
        DictionaryOverlay::compile(self)
    }
}

/// A compiled, ordered set of dictionary substitutions
#[derive(Debug, Clone, Default)]
pub struct DictionaryOverlay {
    rules: Vec<OverlayRule>,
}

#[derive(Debug, Clone)]
struct OverlayRule {
    pattern: Regex,
    value: String,
    match_type: MatchType,
}

impl DictionaryOverlay {
    fn compile(dictionary: &Dictionary) -> Self {
        let mut keyed: Vec<(String, &PronunciationEntry)> = dictionary
            .entries
            .iter()
            .map(|e| (remove_nikud(&e.key), e))
            .filter(|(bare, _)| !bare.is_empty())
            .collect();

        // Longest key first so short keys cannot break longer, already-correct words
        keyed.sort_by(|(a, _), (b, _)| {
            b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b))
        });

        let rules = keyed
            .into_iter()
            .filter_map(|(bare, entry)| {
                Regex::new(&vocalized_pattern(&bare)).ok().map(|pattern| OverlayRule {
                    pattern,
                    value: entry.value.clone(),
                    match_type: entry.match_type,
                })
            })
            .collect();

        Self { rules }
    }

    /// An overlay that changes nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order. The caller is responsible for masking markers.
    pub fn apply(&self, text: &str) -> String {
        self.rules.iter().fold(text.to_string(), |current, rule| {
            replace_matches(&rule.pattern, &current, &rule.value, rule.match_type)
        })
    }

    /// Apply the overlay with page and image markers protected
    pub fn apply_protected(&self, text: &str) -> String {
        if self.is_empty() {
            return text.to_string();
        }
        TokenMasker::for_markers().mask(text).map(|masked| self.apply(masked))
    }
}

/// Each base letter optionally followed by any points, so bare and vocalized
/// occurrences both match.
fn vocalized_pattern(bare_key: &str) -> String {
    bare_key
        .chars()
        .map(|c| format!("{}[\\u{{0591}}-\\u{{05C7}}]*", regex::escape(&c.to_string())))
        .collect()
}

fn replace_matches(pattern: &Regex, text: &str, value: &str, match_type: MatchType) -> String {
    let mut output = String::with_capacity(text.len());
    let mut copied_up_to = 0;
    let mut search_from = 0;

    while search_from < text.len() {
        let Some(found) = pattern.find_at(text, search_from) else {
            break;
        };
        if found.is_empty() {
            break;
        }

        if match_type == MatchType::Partial || has_word_boundaries(text, found.start(), found.end()) {
            output.push_str(&text[copied_up_to..found.start()]);
            output.push_str(value);
            copied_up_to = found.end();
            search_from = found.end();
        } else {
            // A rejected candidate may still hide a valid match one character later
            let step = text[found.start()..].chars().next().map_or(1, char::len_utf8);
            search_from = found.start() + step;
        }
    }

    output.push_str(&text[copied_up_to..]);
    output
}

fn has_word_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}
