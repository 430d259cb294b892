/*!
 * Tests for the pronunciation dictionary overlay
 */

use nikud_narrator::dictionary::{Dictionary, MatchType, PronunciationEntry};
use crate::common;

/// An exact key must never be replaced inside a longer word
#[test]
fn test_overlay_withExactKeyInsidePrefixedWord_shouldLeaveWordUntouched() {
    let overlay = Dictionary::from_entries(vec![
        PronunciationEntry::new("שלום", "שָׁלוֹם", MatchType::Exact),
    ])
    .overlay();

    assert_eq!(overlay.apply("ושלומכם"), "ושלומכם");
    assert_eq!(overlay.apply("שלום, חברים"), "שָׁלוֹם, חברים");
}

/// A partial key matches anywhere and keeps the surrounding letters
#[test]
fn test_overlay_withPartialKey_shouldKeepPrefixLetter() {
    let overlay = Dictionary::from_entries(vec![
        PronunciationEntry::new("בית", "בַּיִת", MatchType::Partial),
    ])
    .overlay();

    assert_eq!(overlay.apply("הבית הגדול"), "הבַּיִת הגדול");
    assert_eq!(overlay.apply("בביתם"), "בבַּיִתם");
}

/// Applying the overlay twice gives the same result as once
#[test]
fn test_overlay_appliedTwice_shouldBeStable() {
    let overlay = Dictionary::from_entries(vec![
        PronunciationEntry::new("בית", "בַּיִת", MatchType::Partial),
        PronunciationEntry::new("שלום", "שָׁלוֹם", MatchType::Exact),
    ])
    .overlay();

    let once = overlay.apply("שלום לבית");
    assert_eq!(overlay.apply(&once), once);
}

/// Test loading a dictionary file from disk
#[test]
fn test_dictionary_load_withFile_shouldReadEntries() -> anyhow::Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "dictionary.json",
        r#"{ "בית": { "value": "בַּיִת", "match_type": "partial", "date": "2024-01-01" } }"#,
    )?;

    let dictionary = Dictionary::load(&path)?;
    let entry = dictionary.get("בית").expect("entry should exist");
    assert_eq!(entry.value, "בַּיִת");
    assert_eq!(entry.date, "2024-01-01");
    Ok(())
}

/// Test that a later insert for the same key replaces the earlier one
#[test]
fn test_dictionary_insert_withExistingKey_shouldReplace() {
    let mut dictionary = Dictionary::new();
    dictionary.insert(PronunciationEntry::new("בית", "בֵּית", MatchType::Partial));
    dictionary.insert(PronunciationEntry::new("בית", "בַּיִת", MatchType::Exact));

    assert_eq!(dictionary.len(), 1);
    assert_eq!(dictionary.get("בית").unwrap().match_type, MatchType::Exact);
}

/// Test that a missing file is an error
#[test]
fn test_dictionary_load_withMissingFile_shouldFail() {
    assert!(Dictionary::load("/nonexistent/dictionary.json").is_err());
}
