/*!
 * Integration tests for application lifecycle
 */

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use nikud_narrator::app_controller::{Controller, NarrateOptions};
use nikud_narrator::dictionary::Dictionary;
use nikud_narrator::errors::JobError;
use nikud_narrator::file_utils::FileManager;
use nikud_narrator::job::{ChannelHost, JobEvent, JobHandle, JobRequest, NarrationJob};
use nikud_narrator::providers::mock::{MockNakdan, MockSpeech, MockSpeechBehavior};
use nikud_narrator::segmenter::UnitKind;
use nikud_narrator::synthesis::VoiceParams;
use crate::common;

fn controller() -> Result<Controller> {
    Controller::with_config(common::test_config())
}

/// Test the controller initialization with default config
#[test]
fn test_controller_initialization_withDefaultConfig_shouldSucceed() -> Result<()> {
    let controller = Controller::new_for_test()?;
    assert_eq!(controller.voice_params(), VoiceParams::new("alloy"));
    Ok(())
}

/// A full run writes audio, timeline and no issues log when nothing failed
#[tokio::test]
async fn test_controller_run_withWorkingProviders_shouldWriteOutputs() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "book.txt", common::sample_book())?;

    let outcome = controller()?
        .run_with_providers(
            Arc::new(MockNakdan::working()),
            Arc::new(MockSpeech::working()),
            NarrateOptions {
                input: input.clone(),
                vocalize: true,
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await?
        .expect("job should run");

    assert_eq!(outcome.audio_path, temp_dir.path().join("book.wav"));
    assert!(outcome.audio_path.exists());
    assert_eq!(outcome.timeline_path, temp_dir.path().join("book.json"));
    assert!(outcome.timeline_path.exists());
    assert!(!FileManager::issues_log_path(&outcome.audio_path).exists());
    Ok(())
}

/// Units replaced by silence end up in the issues log
#[tokio::test]
async fn test_controller_run_withFailingUnit_shouldWriteIssuesLog() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "book.txt", "טוב. רע מאוד. טוב.")?;

    let outcome = controller()?
        .run_with_providers(
            Arc::new(MockNakdan::working()),
            Arc::new(MockSpeech::failing_on("רע")),
            NarrateOptions {
                input,
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await?
        .expect("job should run");

    let issues = FileManager::read_to_string(FileManager::issues_log_path(&outcome.audio_path))?;
    assert_eq!(outcome.skipped.len(), 1);
    assert!(issues.contains("Unit 1 was replaced by silence: רע מאוד."));
    Ok(())
}

/// An existing output is left alone without the force flag
#[tokio::test]
async fn test_controller_run_withExistingOutput_shouldSkipUnlessForced() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "book.txt", "שלום.")?;
    common::create_test_file(temp_dir.path(), "book.wav", "old")?;
    let speech = MockSpeech::working();

    let skipped = controller()?
        .run_with_providers(
            Arc::new(MockNakdan::working()),
            Arc::new(speech.clone()),
            NarrateOptions {
                input: input.clone(),
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await?;
    assert!(skipped.is_none());
    assert_eq!(speech.calls(), 0);

    let forced = controller()?
        .run_with_providers(
            Arc::new(MockNakdan::working()),
            Arc::new(speech.clone()),
            NarrateOptions {
                input,
                force_overwrite: true,
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await?;
    assert!(forced.is_some());
    assert_eq!(speech.calls(), 1);
    Ok(())
}

/// A shutdown request cancels the job and leaves no output
#[tokio::test]
async fn test_controller_run_withShutdown_shouldCancelAndPersistNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "book.txt", "אחת. שתיים. שלוש.")?;
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = controller()?
        .run_with_providers(
            Arc::new(MockNakdan::working()),
            Arc::new(MockSpeech::new(MockSpeechBehavior::Slow { delay_ms: 10_000 })),
            NarrateOptions {
                input,
                ..Default::default()
            },
            shutdown,
        )
        .await;

    let error = result.expect_err("job should be cancelled");
    assert!(matches!(error.downcast_ref::<JobError>(), Some(JobError::Cancelled)));
    assert!(!temp_dir.path().join("book.wav").exists());
    assert!(!temp_dir.path().join("book.json").exists());
    Ok(())
}

/// A missing input file is reported before anything starts
#[tokio::test]
async fn test_controller_run_withMissingInput_shouldFail() -> Result<()> {
    let result = controller()?
        .run_with_providers(
            Arc::new(MockNakdan::working()),
            Arc::new(MockSpeech::working()),
            NarrateOptions {
                input: "/nonexistent/book.txt".into(),
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await;

    assert!(result.is_err());
    Ok(())
}

/// The vocalize command writes a sibling file
#[tokio::test]
async fn test_controller_vocalizeFile_withDefaultOutput_shouldWriteNikudFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "book.txt", "שלום עולם")?;

    let output = controller()?
        .vocalize_file_with_provider(Arc::new(MockNakdan::working()), &input, None, None)
        .await?;

    assert_eq!(output, temp_dir.path().join("book.nikud.txt"));
    assert_eq!(FileManager::read_to_string(&output)?, "ש\u{05B7}לום ע\u{05B7}ולם");
    Ok(())
}

/// The segment command shows normalized units
#[test]
fn test_controller_segmentFile_withMarkers_shouldListUnits() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "book.txt", "[PAGE:7] בית-ספר. [IMG:a.png]")?;

    let units = controller()?.segment_file(&input)?;

    assert_eq!(units.len(), 3);
    assert_eq!(units[0].kind, UnitKind::PageTrigger(7));
    assert_eq!(units[1].raw_text, "בית ספר.");
    assert_eq!(units[2].kind, UnitKind::ImageMarker("a.png".to_string()));
    Ok(())
}

/// A spawned job reports through the channel and finishes once
#[tokio::test]
async fn test_jobHandle_withChannelHost_shouldStreamEventsAndFinish() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (host, mut events) = ChannelHost::new(Dictionary::new(), VoiceParams::new("alloy"));
    let job = NarrationJob::new(
        Arc::new(MockNakdan::working()),
        Arc::new(MockSpeech::working()),
        common::test_job_config(2),
    );
    let request = JobRequest {
        text: "שלום. להתראות.".to_string(),
        output: temp_dir.path().join("book.wav"),
        vocalize: true,
    };

    let handle = JobHandle::spawn(job, request, Arc::new(host));
    let outcome = handle.wait().await?;

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    assert_eq!(outcome.unit_count, 2);
    assert!(received.contains(&JobEvent::Progress(100)));
    assert!(received.contains(&JobEvent::Status("Done".to_string())));
    Ok(())
}
