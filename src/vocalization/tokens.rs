/*!
 * Splitting text into Hebrew runs and everything else, and putting it back together.
 */

use once_cell::sync::Lazy;
use regex::Regex;

static HEBREW_RUN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{0590}-\u{05FF}]+").expect("Invalid Hebrew run regex")
});

/// One piece of the tokenized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// A run of Hebrew-block characters, sent for vocalization
    Hebrew(String),
    /// Anything between Hebrew runs, passed through untouched
    Other(String),
}

/// Text split into alternating Hebrew and non-Hebrew pieces
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenizedText {
    pieces: Vec<Piece>,
}

impl TokenizedText {
    pub fn new(text: &str) -> Self {
        let mut pieces = Vec::new();
        let mut last_end = 0;
        for run in HEBREW_RUN_REGEX.find_iter(text) {
            if run.start() > last_end {
                pieces.push(Piece::Other(text[last_end..run.start()].to_string()));
            }
            pieces.push(Piece::Hebrew(run.as_str().to_string()));
            last_end = run.end();
        }
        if last_end < text.len() {
            pieces.push(Piece::Other(text[last_end..].to_string()));
        }
        Self { pieces }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// The Hebrew runs, in order
    pub fn words(&self) -> Vec<&str> {
        self.pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Hebrew(word) => Some(word.as_str()),
                Piece::Other(_) => None,
            })
            .collect()
    }

    /// Rebuild the text with the Hebrew runs replaced, in order, by `replacements`.
    ///
    /// Runs without a replacement keep their original text.
    pub fn reassemble<S: AsRef<str>>(&self, replacements: &[S]) -> String {
        let mut replacements = replacements.iter();
        let mut output = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Hebrew(word) => match replacements.next() {
                    Some(replacement) => output.push_str(replacement.as_ref()),
                    None => output.push_str(word),
                },
                Piece::Other(text) => output.push_str(text),
            }
        }
        output
    }
}
