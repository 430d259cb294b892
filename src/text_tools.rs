/*!
 * Hebrew text helpers shared by the segmenter, the vocalization service
 * and the dictionary overlay.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::markers::TokenMasker;

/// First code point of the Hebrew block
pub const HEBREW_BLOCK_START: char = '\u{0590}';
/// Last code point of the Hebrew block
pub const HEBREW_BLOCK_END: char = '\u{05FF}';

/// Dagesh / mappiq point
pub const DAGESH: char = '\u{05BC}';

/// Letters that may legitimately carry a dagesh in the vocalizer output
pub const DAGESH_LETTERS: [char; 4] = ['\u{05D1}', '\u{05DB}', '\u{05E4}', '\u{05D5}'];

static NIKUD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{0591}-\u{05C7}]").expect("Invalid nikud regex")
});

/// Whether a character belongs to the Hebrew Unicode block (letters, points, punctuation)
pub fn is_hebrew(c: char) -> bool {
    (HEBREW_BLOCK_START..=HEBREW_BLOCK_END).contains(&c)
}

/// Whether a character is a cantillation mark or vowel point
pub fn is_nikud(c: char) -> bool {
    ('\u{0591}'..='\u{05C7}').contains(&c)
}

/// Whether a character counts as part of a word for boundary checks
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_hebrew(c)
}

/// Remove all nikud and cantillation marks
pub fn remove_nikud(text: &str) -> String {
    NIKUD_REGEX.replace_all(text, "").into_owned()
}

/// Drop dagesh marks whose base letter cannot carry one.
///
/// The base letter is the nearest preceding non-mark character, so a dagesh
/// written after another point (e.g. a vowel) is still judged by its letter.
pub fn clean_dagesh(word: &str) -> String {
    let mut cleaned = String::with_capacity(word.len());
    let mut base_letter: Option<char> = None;

    for c in word.chars() {
        if c == DAGESH {
            if base_letter.is_some_and(|letter| DAGESH_LETTERS.contains(&letter)) {
                cleaned.push(c);
            }
            continue;
        }
        if !is_nikud(c) {
            base_letter = Some(c);
        }
        cleaned.push(c);
    }

    cleaned
}

/// Normalise text before it is segmented for synthesis.
///
/// Dashes are read aloud badly by the speech engines, so they become spaces
/// and bullets disappear. Markers are masked so image paths survive untouched.
pub fn normalize_for_speech(text: &str) -> String {
    TokenMasker::for_markers()
        .mask(text)
        .map(|masked| masked.replace(['-', '–'], " ").replace('•', ""))
}
