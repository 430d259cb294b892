/*!
 * Common test utilities for the nikud-narrator test suite
 */

use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;
use anyhow::Result;
use parking_lot::Mutex;
use tempfile::TempDir;

use nikud_narrator::app_config::{Config, JobConfig};
use nikud_narrator::dictionary::Dictionary;
use nikud_narrator::job::JobHost;
use nikud_narrator::synthesis::VoiceParams;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A short Hebrew text with page and image markers
pub fn sample_book() -> &'static str {
    "[PAGE:1]\nשלום לכולם. היום נלמד על הבית.\n\n[IMG:images/house.png]\nהבית גדול! יש בו 3.5 חדרים.\n[PAGE:2]\nסוף."
}

/// `count` copies of one Hebrew word, space separated
pub fn hebrew_words(count: usize) -> String {
    vec!["שלום"; count].join(" ")
}

/// A config usable without any network access
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.speech.api_key = "sk-test".to_string();
    config.speech.retry_count = 0;
    config.speech.retry_backoff_ms = 1;
    config
}

/// Job settings with a fixed synthesis limit and fast retries
pub fn test_job_config(max_concurrent: usize) -> JobConfig {
    let mut job_config = JobConfig::from(&test_config()).with_concurrency(max_concurrent);
    job_config.synthesis.adaptive = false;
    job_config.synthesis.timeout = Duration::from_secs(5);
    job_config
}

/// A host that records everything the job reports
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub dictionary: Dictionary,
    pub voice: Option<VoiceParams>,
    pub progress: Mutex<Vec<u8>>,
    pub statuses: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn with_dictionary(dictionary: Dictionary) -> Self {
        Self {
            dictionary,
            ..Default::default()
        }
    }

    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().clone()
    }
}

impl JobHost for RecordingHost {
    fn report_progress(&self, percent: u8) {
        self.progress.lock().push(percent);
    }

    fn report_status(&self, message: &str) {
        self.statuses.lock().push(message.to_string());
    }

    fn dictionary(&self) -> Dictionary {
        self.dictionary.clone()
    }

    fn voice_params(&self) -> VoiceParams {
        self.voice.clone().unwrap_or_else(|| VoiceParams::new("alloy"))
    }
}
