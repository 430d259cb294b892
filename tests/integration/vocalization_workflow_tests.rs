/*!
 * Vocalization workflow tests with a mocked Nakdan service
 */

use std::sync::Arc;

use nikud_narrator::dictionary::{Dictionary, DictionaryOverlay, MatchType, PronunciationEntry};
use nikud_narrator::providers::mock::MockNakdan;
use nikud_narrator::vocalization::{VocalizationBatchService, VocalizationSettings};
use crate::common;

fn service(mock: &MockNakdan, batch_size: usize, concurrent_requests: usize) -> VocalizationBatchService<MockNakdan> {
    VocalizationBatchService::new(
        Arc::new(mock.clone()),
        VocalizationSettings {
            batch_size,
            concurrent_requests,
            ..Default::default()
        },
    )
}

/// A batch that comes back two words short is redone word by word
#[tokio::test]
async fn test_vocalize_withBatchMissingTwoWords_shouldMakeOneHundredWordCalls() {
    let mock = MockNakdan::dropping_words(2);

    let outcome = service(&mock, 100, 5)
        .vocalize(&common::hebrew_words(100), &DictionaryOverlay::empty(), |_| {})
        .await;

    assert_eq!(mock.batch_calls(), 1);
    assert_eq!(mock.word_calls(), 100);
    assert_eq!(outcome.text.split_whitespace().count(), 100);
}

/// Complete batches never trigger single-word requests
#[tokio::test]
async fn test_vocalize_withCompleteBatches_shouldMakeNoWordCalls() {
    let mock = MockNakdan::working();

    let outcome = service(&mock, 50, 2)
        .vocalize(&common::hebrew_words(500), &DictionaryOverlay::empty(), |_| {})
        .await;

    assert_eq!(mock.batch_calls(), 10);
    assert_eq!(mock.word_calls(), 0);
    assert_eq!(outcome.word_count, 500);
    assert_eq!(outcome.failed_batches, 0);
}

/// Failed batches fall back, and the layout of the text is kept
#[tokio::test]
async fn test_vocalize_withFailingBatches_shouldKeepLayoutAndMarkers() {
    let mock = MockNakdan::failing_batches();
    let text = "[PAGE:1]\nשלום עולם,\n\n[IMG:pic.png] בית גדול!";

    let outcome = service(&mock, 2, 3)
        .vocalize(text, &DictionaryOverlay::empty(), |_| {})
        .await;

    assert_eq!(outcome.failed_batches, 2);
    assert_eq!(outcome.fallback_words, 4);
    assert_eq!(
        outcome.text,
        "[PAGE:1]\nש\u{05B7}לום ע\u{05B7}ולם,\n\n[IMG:pic.png] ב\u{05B7}ית ג\u{05B7}דול!"
    );
}

/// The dictionary wins over the remote vocalization, exact keys stay whole-word
#[tokio::test]
async fn test_vocalize_withExactEntry_shouldNotTouchLongerWords() {
    let mock = MockNakdan::working().with_vocalizer(|word| word.to_string());
    let overlay = Dictionary::from_entries(vec![
        PronunciationEntry::new("שלום", "\u{05E9}\u{05B8}\u{05C1}\u{05DC}\u{05D5}\u{05B9}\u{05DD}", MatchType::Exact),
    ])
    .overlay();

    let outcome = service(&mock, 100, 1)
        .vocalize("שלום ושלומכם", &overlay, |_| {})
        .await;

    assert_eq!(outcome.text, "\u{05E9}\u{05B8}\u{05C1}\u{05DC}\u{05D5}\u{05B9}\u{05DD} ושלומכם");
}
