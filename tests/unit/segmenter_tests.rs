/*!
 * Tests for text segmentation
 */

use nikud_narrator::segmenter::{TextSegmenter, UnitKind};
use crate::common;

/// Test segmentation of a realistic Hebrew page
#[test]
fn test_segment_withSampleBook_shouldKeepMarkersAndOrder() {
    let units = TextSegmenter::new().segment(common::sample_book());
    let kinds: Vec<&UnitKind> = units.iter().map(|u| &u.kind).collect();

    assert_eq!(kinds[0], &UnitKind::PageTrigger(1));
    assert!(kinds.contains(&&UnitKind::ImageMarker("images/house.png".to_string())));
    assert!(kinds.contains(&&UnitKind::PageTrigger(2)));

    for (position, unit) in units.iter().enumerate() {
        assert_eq!(unit.index, position);
    }
}

/// Test that decimals inside Hebrew sentences do not split them
#[test]
fn test_segment_withHebrewDecimal_shouldKeepSentenceWhole() {
    let units = TextSegmenter::new().segment("יש בו 3.5 חדרים. סוף");
    let texts: Vec<&str> = units.iter().map(|u| u.raw_text.as_str()).collect();

    assert_eq!(texts, vec!["יש בו 3.5 חדרים.", "סוף"]);
}

/// Test that question and exclamation runs close a unit together
#[test]
fn test_segment_withTerminatorRun_shouldCloseOnce() {
    let units = TextSegmenter::new().segment("באמת?! כן.");
    let texts: Vec<&str> = units.iter().map(|u| u.raw_text.as_str()).collect();

    assert_eq!(texts, vec!["באמת?!", "כן."]);
}

/// Test that trimmed speech text drops layout whitespace only
#[test]
fn test_speechText_withTrailingNewlines_shouldTrim() {
    let units = TextSegmenter::new().segment("שורה ראשונה.\n\nשנייה");

    assert_eq!(units[0].raw_text, "שורה ראשונה.\n\n");
    assert_eq!(units[0].speech_text(), "שורה ראשונה.");
}

/// Test the JSON lines shape used by the segment command
#[test]
fn test_unit_serialization_shouldTagKind() {
    let units = TextSegmenter::new().segment("[PAGE:4]");
    let json = serde_json::to_value(&units[0]).unwrap();

    assert_eq!(json["kind"]["type"], "page_trigger");
    assert_eq!(json["kind"]["value"], 4);
}
