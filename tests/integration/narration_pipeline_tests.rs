/*!
 * End-to-end tests for the narration pipeline with mocked services
 */

use std::sync::Arc;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use nikud_narrator::dictionary::{Dictionary, MatchType, PronunciationEntry};
use nikud_narrator::errors::JobError;
use nikud_narrator::job::{JobRequest, NarrationJob};
use nikud_narrator::providers::mock::{MockNakdan, MockSpeech};
use nikud_narrator::segmenter::TextSegmenter;
use nikud_narrator::timeline::load_timeline;
use crate::common::{self, RecordingHost};

fn narration_job(speech: &MockSpeech, max_concurrent: usize) -> NarrationJob<MockNakdan, MockSpeech> {
    NarrationJob::new(
        Arc::new(MockNakdan::working()),
        Arc::new(speech.clone()),
        common::test_job_config(max_concurrent),
    )
}

fn request(dir: &std::path::Path, text: &str) -> JobRequest {
    JobRequest {
        text: text.to_string(),
        output: dir.join("book.wav"),
        vocalize: false,
    }
}

/// A page marker followed by two sentences
#[tokio::test]
async fn test_narrate_withPageAndTwoSentences_shouldBuildExpectedTimeline() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let speech = MockSpeech::working();
    let host = RecordingHost::default();

    let outcome = narration_job(&speech, 2)
        .run(&request(temp_dir.path(), "[PAGE:1]\nHello. World."), &host, &CancellationToken::new())
        .await?;
    let entries = load_timeline(&outcome.timeline_path)?;

    let d1 = speech.expected_duration_ms("Hello.");
    let d2 = speech.expected_duration_ms("World.");
    let gap = common::test_config().audio.pause_sentence_ms;

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].page_trigger, Some(1));
    assert_eq!((entries[0].start_ms, entries[0].end_ms), (0, 0));
    assert_eq!(entries[1].text, "Hello.");
    assert_eq!((entries[1].start_ms, entries[1].end_ms), (0, d1));
    assert_eq!(entries[2].text, "World.");
    assert_eq!((entries[2].start_ms, entries[2].end_ms), (d1 + gap, d1 + gap + d2));
    assert_eq!(outcome.duration_ms, d1 + gap + d2 + gap);
    Ok(())
}

/// Every unit, markers included, gets exactly one timeline entry
#[tokio::test]
async fn test_narrate_withSampleBook_shouldHaveOneEntryPerUnit() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let host = RecordingHost::default();
    let text = common::sample_book();

    let outcome = narration_job(&MockSpeech::working(), 3)
        .run(&request(temp_dir.path(), text), &host, &CancellationToken::new())
        .await?;
    let entries = load_timeline(&outcome.timeline_path)?;
    let units = TextSegmenter::new().segment(text);

    assert_eq!(entries.len(), units.len());
    assert_eq!(outcome.unit_count, units.len());
    for (entry, unit) in entries.iter().zip(&units) {
        assert_eq!(entry.index, unit.index);
        assert_eq!(entry.text.is_empty(), !unit.is_speakable() && entry.page_trigger.is_some());
    }

    let image = entries.iter().find(|e| e.is_image).expect("image entry");
    assert_eq!(image.text, "[IMG:images/house.png]");
    assert_eq!(image.end_ms - image.start_ms, common::test_config().audio.image_dwell_ms);
    Ok(())
}

/// Concurrency changes completion order but never the timeline
#[tokio::test]
async fn test_narrate_withDifferentConcurrency_shouldProduceIdenticalTimelines() -> Result<()> {
    let text = "אחת. שתיים. שלוש. ארבע. חמש. שש. שבע. שמונה. תשע. עשר.";
    let mut timelines = Vec::new();

    for max_concurrent in [1, 2, 4, 8] {
        let temp_dir = common::create_temp_dir()?;
        let speech = MockSpeech::jittered(15);
        let outcome = narration_job(&speech, max_concurrent)
            .run(&request(temp_dir.path(), text), &RecordingHost::default(), &CancellationToken::new())
            .await?;

        assert!(speech.peak_in_flight() <= max_concurrent);
        timelines.push(load_timeline(&outcome.timeline_path)?);
    }

    for timeline in &timelines[1..] {
        assert_eq!(timeline, &timelines[0]);
    }
    Ok(())
}

/// The pool stays full: with many units the peak reaches the limit
#[tokio::test]
async fn test_narrate_withManyUnits_shouldSaturateButNeverExceedLimit() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let text = (0..20).map(|i| format!("משפט מספר {}.", i)).collect::<Vec<_>>().join(" ");
    let speech = MockSpeech::jittered(10);

    narration_job(&speech, 4)
        .run(&request(temp_dir.path(), &text), &RecordingHost::default(), &CancellationToken::new())
        .await?;

    assert_eq!(speech.calls(), 20);
    assert_eq!(speech.peak_in_flight(), 4);
    Ok(())
}

/// A failing unit becomes silence and is reported, the job still succeeds
#[tokio::test]
async fn test_narrate_withFailingUnit_shouldFallBackToSilenceAndReportIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let speech = MockSpeech::failing_on("broken");
    let host = RecordingHost::default();

    let outcome = narration_job(&speech, 2)
        .run(&request(temp_dir.path(), "Fine. This is broken. Fine again."), &host, &CancellationToken::new())
        .await?;
    let entries = load_timeline(&outcome.timeline_path)?;

    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].index, 1);
    assert_eq!(outcome.skipped[0].text, "This is broken.");
    assert_eq!(entries.len(), 3);
    let silence = common::test_config().audio.fallback_silence_ms;
    assert_eq!(entries[1].end_ms - entries[1].start_ms, silence);
    assert_eq!(host.progress().last(), Some(&100));
    Ok(())
}

/// Vocalization, dictionary and synthesis together
#[tokio::test]
async fn test_narrate_withVocalizationAndDictionary_shouldSendOverlaidText() -> Result<()> {
    fn vocalize(word: &str) -> String {
        match word {
            "הבית" => "\u{05D4}\u{05B7}\u{05D1}\u{05BC}\u{05B5}\u{05D9}\u{05EA}".to_string(),
            other => other.to_string(),
        }
    }

    const HOUSE: &str = "\u{05D1}\u{05BC}\u{05B7}\u{05D9}\u{05B4}\u{05EA}";

    let temp_dir = common::create_temp_dir()?;
    let speech = MockSpeech::working();
    let job = NarrationJob::new(
        Arc::new(MockNakdan::working().with_vocalizer(vocalize)),
        Arc::new(speech.clone()),
        common::test_job_config(2),
    );
    let host = RecordingHost::with_dictionary(Dictionary::from_entries(vec![
        PronunciationEntry::new("בית", HOUSE, MatchType::Partial),
    ]));
    let mut job_request = request(temp_dir.path(), "הבית הגדול.");
    job_request.vocalize = true;

    let outcome = job.run(&job_request, &host, &CancellationToken::new()).await?;

    assert!(outcome.vocalization_error.is_none());
    assert_eq!(speech.inputs(), vec![format!("\u{05D4}\u{05B7}{} הגדול.", HOUSE)]);
    assert!(host.statuses().iter().any(|s| s == "Adding nikud"));
    Ok(())
}

/// Dashes are spoken as pauses, not as words
#[tokio::test]
async fn test_narrate_withDashes_shouldNormalizeBeforeSynthesis() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let speech = MockSpeech::working();

    narration_job(&speech, 1)
        .run(&request(temp_dir.path(), "• בית–ספר גדול-מאוד."), &RecordingHost::default(), &CancellationToken::new())
        .await?;

    assert_eq!(speech.inputs(), vec!["בית ספר גדול מאוד.".to_string()]);
    Ok(())
}

/// Nothing is written when the output cannot be persisted
#[tokio::test]
async fn test_narrate_withUnwritableOutput_shouldFailWithPersistError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let job_request = JobRequest {
        text: "Hello.".to_string(),
        output: temp_dir.path().join("missing").join("book.wav"),
        vocalize: false,
    };

    let result = narration_job(&MockSpeech::working(), 1)
        .run(&job_request, &RecordingHost::default(), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(JobError::Persist(_))));
    assert!(!job_request.output.exists());
    Ok(())
}
