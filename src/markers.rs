/*!
 * Structural markers and reversible masking.
 *
 * Input text carries two kinds of inline markers:
 * - `[PAGE:<n>]`: a page turn, `n` being a non-negative integer
 * - `[IMG:<path>]`: an inline image shown at that point of the narration
 *
 * Any pass that must not alter such spans (vocalization, dictionary overlay)
 * masks them first with collision-free sentinel tokens and restores them at
 * the end. `TokenMasker` / `MaskedText` is that single shared primitive.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches either marker form. Group 1 is the page number, group 2 the image path.
pub static MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[PAGE:(\d+)\]|\[IMG:(.*?)\]").expect("Invalid marker regex")
});

/// A marker recognised in the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Page turn carrying its page number
    Page(u32),
    /// Inline image carrying its path
    Image(String),
}

impl Marker {
    /// Parse a string that consists of exactly one marker.
    ///
    /// Anything else, including malformed markers like `[PAGE:x]`, is `None`
    /// and therefore treated as literal text by callers.
    pub fn parse(text: &str) -> Option<Self> {
        let captures = MARKER_REGEX.captures(text)?;
        let whole = captures.get(0)?;
        if whole.start() != 0 || whole.end() != text.len() {
            return None;
        }

        if let Some(page) = captures.get(1) {
            // Page numbers too large for u32 are not markers
            return page.as_str().parse().ok().map(Marker::Page);
        }

        captures
            .get(2)
            .map(|path| Marker::Image(path.as_str().to_string()))
    }
}

/// Sentinel character used to build mask tokens (Unicode private use area).
const SENTINEL: char = '\u{F8FF}';

/// Builds reversible substitutions for every match of a pattern
#[derive(Debug, Clone)]
pub struct TokenMasker {
    pattern: Regex,
}

impl TokenMasker {
    /// Masker for an arbitrary pattern
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }

    /// Masker for page and image markers
    pub fn for_markers() -> Self {
        Self::new(MARKER_REGEX.clone())
    }

    /// Replace every match with a unique placeholder token.
    ///
    /// The sentinel run around each token is made longer than any sentinel run
    /// already present in the input, so a placeholder can never collide with
    /// text that was there before masking.
    pub fn mask(&self, text: &str) -> MaskedText {
        let longest_run = longest_char_run(text, SENTINEL);
        let fence: String = std::iter::repeat_n(SENTINEL, longest_run + 1).collect();

        let mut originals = Vec::new();
        let masked = self
            .pattern
            .replace_all(text, |captures: &regex::Captures<'_>| {
                let token = format!("{}{}{}", fence, originals.len(), fence);
                originals.push(captures[0].to_string());
                token
            })
            .into_owned();

        MaskedText {
            text: masked,
            fence,
            originals,
        }
    }
}

/// Text whose protected spans have been replaced by placeholder tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedText {
    /// The masked text
    pub text: String,
    fence: String,
    originals: Vec<String>,
}

impl MaskedText {
    /// Number of spans that were masked
    pub fn masked_count(&self) -> usize {
        self.originals.len()
    }

    /// The placeholder token standing for the n-th masked span
    pub fn token(&self, index: usize) -> String {
        format!("{}{}{}", self.fence, index, self.fence)
    }

    /// Restore the original spans in a (possibly transformed) version of the masked text
    pub fn unmask(&self, text: &str) -> String {
        let mut restored = text.to_string();
        // Highest index first so a token never matches inside a longer one
        for (index, original) in self.originals.iter().enumerate().rev() {
            restored = restored.replace(&self.token(index), original);
        }
        restored
    }

    /// Apply a transformation to the masked text and restore the spans afterwards
    pub fn map<F>(&self, transform: F) -> String
    where
        F: FnOnce(&str) -> String,
    {
        self.unmask(&transform(&self.text))
    }
}

fn longest_char_run(text: &str, target: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == target {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}
