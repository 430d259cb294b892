use anyhow::{Result, Context, anyhow};
use log::{error, warn, info, debug};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use crate::app_config::{Config, JobConfig};
use crate::dictionary::Dictionary;
use crate::file_utils::FileManager;
use crate::job::{ChannelHost, JobEvent, JobHandle, JobOutcome, JobRequest, NarrationJob};
use crate::providers::Provider;
use crate::providers::nakdan::{Nakdan, NakdanRequest, NakdanResponse};
use crate::providers::speech::{Speech, SpeechRequest, SpeechResponse};
use crate::segmenter::{TextSegmenter, TextUnit};
use crate::synthesis::VoiceParams;
use crate::text_tools::normalize_for_speech;
use crate::vocalization::VocalizationBatchService;

// @module: Application controller for narration runs

/// How long a cancelled job gets to stop on its own before it is aborted
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// One narration run as requested on the command line
#[derive(Debug, Clone, Default)]
pub struct NarrateOptions {
    pub input: PathBuf,
    /// Audio output; defaults to the input with a `.wav` extension
    pub output: Option<PathBuf>,
    pub dictionary: Option<PathBuf>,
    pub vocalize: bool,
    pub force_overwrite: bool,
}

/// Main application controller for narration
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    /// Create a new controller for test purposes with default configuration
    pub fn new_for_test() -> Result<Self> {
        Self::with_config(Config::default())
    }

    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Voice for new jobs, from the configuration
    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            voice: self.config.speech.voice.clone(),
            rate: self.config.speech.rate,
            volume: self.config.speech.volume,
        }
    }

    // @creates: Nakdan client from the configuration
    pub fn nakdan_provider(&self) -> Nakdan {
        let settings = &self.config.vocalization;
        Nakdan::new_with_config(
            settings.endpoint.as_str(),
            Duration::from_secs(settings.timeout_secs),
            settings.retry_count,
            settings.retry_backoff_ms,
        )
    }

    // @creates: Speech client from the configuration
    pub fn speech_provider(&self) -> Result<Speech> {
        let settings = &self.config.speech;
        Speech::new(
            settings.endpoint.as_str(),
            Some(settings.api_key.as_str()),
            settings.model.as_str(),
            Duration::from_secs(settings.timeout_secs),
        )
        .context("Failed to create speech client")
    }

    /// Narrate a text file with the configured remote services
    pub async fn run(&self, options: NarrateOptions, shutdown: CancellationToken) -> Result<Option<JobOutcome>> {
        let nakdan = Arc::new(self.nakdan_provider());
        let speech = Arc::new(self.speech_provider()?);
        self.run_with_providers(nakdan, speech, options, shutdown).await
    }

    /// Narrate a text file with the given providers.
    ///
    /// Returns `None` when the output already exists and overwriting was not requested.
    pub async fn run_with_providers<N, S>(
        &self,
        nakdan: Arc<N>,
        speech: Arc<S>,
        options: NarrateOptions,
        shutdown: CancellationToken,
    ) -> Result<Option<JobOutcome>>
    where
        N: Provider<Request = NakdanRequest, Response = NakdanResponse> + 'static,
        S: Provider<Request = SpeechRequest, Response = SpeechResponse> + 'static,
    {
        let start_time = std::time::Instant::now();

        if !FileManager::file_exists(&options.input) {
            return Err(anyhow!("Input file does not exist: {:?}", options.input));
        }

        let output = options
            .output
            .clone()
            .unwrap_or_else(|| FileManager::generate_output_path(&options.input, None, "wav"));
        if output.exists() && !options.force_overwrite {
            warn!("Skipping file, {} already exists (use -f to force overwrite)", output.display());
            return Ok(None);
        }
        if let Some(parent) = output.parent() {
            FileManager::ensure_dir(parent)?;
        }

        let text = FileManager::read_to_string(&options.input)?;
        let dictionary = self.load_dictionary(options.dictionary.as_deref())?;
        let mut issues = self.check_connections(nakdan.as_ref(), speech.as_ref(), options.vocalize).await;

        info!(
            "Narrating {} with voice {} ({} requests in flight)",
            options.input.display(),
            self.config.speech.voice,
            self.config.speech.max_concurrent
        );

        let (host, events) = ChannelHost::new(dictionary, self.voice_params());
        let job = NarrationJob::new(nakdan, speech, JobConfig::from(&self.config));
        let request = JobRequest {
            text,
            output: output.clone(),
            vocalize: options.vocalize,
        };

        let progress_bar = Self::progress_bar(100, "{pos}%");
        let forwarder = tokio::spawn(Self::forward_events(events, progress_bar.clone()));

        let handle = JobHandle::spawn(job, request, Arc::new(host));
        let result = handle.wait_or_cancel(&shutdown, CANCEL_GRACE).await;

        let _ = forwarder.await;
        progress_bar.finish_and_clear();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Narration failed: {}", e);
                return Err(e.into());
            }
        };

        if let Some(message) = &outcome.vocalization_error {
            issues.push(format!("[WARN] {}", message));
        }
        for unit in &outcome.skipped {
            warn!("Unit {} was replaced by silence: {}", unit.index, unit.text);
            issues.push(format!("[WARN] Unit {} was replaced by silence: {}", unit.index, unit.text));
        }

        if !issues.is_empty() {
            let log_file_path = FileManager::issues_log_path(&output);
            match self.write_issues_log(&issues, &log_file_path) {
                Ok(()) => info!("Issues written to {}", log_file_path.display()),
                Err(e) => warn!("Failed to write issues log: {}", e),
            }
        }

        info!(
            "Success: {} ({}, {} units, {} skipped) in {}",
            outcome.audio_path.display(),
            Self::format_duration(Duration::from_millis(outcome.duration_ms)),
            outcome.unit_count,
            outcome.skipped.len(),
            Self::format_duration(start_time.elapsed())
        );

        Ok(Some(outcome))
    }

    /// Add nikud to a text file and write the result
    pub async fn vocalize_file(&self, input: &Path, output: Option<PathBuf>, dictionary: Option<&Path>) -> Result<PathBuf> {
        let nakdan = Arc::new(self.nakdan_provider());
        self.vocalize_file_with_provider(nakdan, input, output, dictionary).await
    }

    /// Add nikud to a text file using the given provider
    pub async fn vocalize_file_with_provider<N>(
        &self,
        nakdan: Arc<N>,
        input: &Path,
        output: Option<PathBuf>,
        dictionary: Option<&Path>,
    ) -> Result<PathBuf>
    where
        N: Provider<Request = NakdanRequest, Response = NakdanResponse>,
    {
        let text = FileManager::read_to_string(input)?;
        let overlay = self.load_dictionary(dictionary)?.overlay();
        let output = output.unwrap_or_else(|| FileManager::generate_output_path(input, None, "nikud.txt"));

        let settings = JobConfig::from(&self.config).vocalization;
        let service = VocalizationBatchService::new(nakdan, settings);

        let progress_bar = Self::progress_bar(100, "{pos}%");
        progress_bar.set_message("Adding nikud");
        let pb = progress_bar.clone();
        let outcome = service
            .vocalize(&text, &overlay, move |p| pb.set_position(p as u64))
            .await;
        progress_bar.finish_and_clear();

        if let Some(message) = &outcome.error {
            return Err(anyhow!("{}", message));
        }
        if outcome.fallback_words > 0 {
            warn!(
                "{} words were vocalized one by one after {} batch failures",
                outcome.fallback_words, outcome.failed_batches
            );
        }

        FileManager::write_to_file(&output, &outcome.text)?;
        info!("Success: {} ({} words)", output.display(), outcome.word_count);
        Ok(output)
    }

    /// Split a text file into the units a narration would use
    pub fn segment_file(&self, input: &Path) -> Result<Vec<TextUnit>> {
        let mut text = FileManager::read_to_string(input)?;
        if self.config.text.normalize_dashes {
            text = normalize_for_speech(&text);
        }
        Ok(TextSegmenter::new().segment(&text))
    }

    fn load_dictionary(&self, path: Option<&Path>) -> Result<Dictionary> {
        match path {
            Some(path) => {
                let dictionary = Dictionary::load(path)?;
                info!("Loaded {} dictionary entries from {}", dictionary.len(), path.display());
                Ok(dictionary)
            }
            None => Ok(Dictionary::new()),
        }
    }

    /// Check the remote services before a long run. Failures are only warnings.
    async fn check_connections<N, S>(&self, nakdan: &N, speech: &S, vocalize: bool) -> Vec<String>
    where
        N: Provider<Request = NakdanRequest, Response = NakdanResponse>,
        S: Provider<Request = SpeechRequest, Response = SpeechResponse>,
    {
        let mut issues = Vec::new();

        if vocalize {
            match nakdan.test_connection().await {
                Ok(()) => debug!("Nakdan connection OK"),
                Err(e) => {
                    warn!("Nakdan connection check failed: {}", e);
                    issues.push(format!("[WARN] Nakdan connection check failed: {}", e));
                }
            }
        }

        match speech.test_connection().await {
            Ok(()) => debug!("Speech connection OK"),
            Err(e) => {
                warn!("Speech connection check failed: {}", e);
                issues.push(format!("[WARN] Speech connection check failed: {}", e));
            }
        }

        issues
    }

    async fn forward_events(mut events: tokio::sync::mpsc::UnboundedReceiver<JobEvent>, progress_bar: ProgressBar) {
        while let Some(event) = events.recv().await {
            match event {
                JobEvent::Progress(percent) => progress_bar.set_position(percent as u64),
                JobEvent::Status(message) => progress_bar.set_message(message),
            }
        }
    }

    fn progress_bar(length: u64, unit: &str) -> ProgressBar {
        let progress_bar = ProgressBar::new(length);
        let template_result = ProgressStyle::default_bar()
            .template(&format!("{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {} {{msg}} {{eta}}", unit))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));
        progress_bar
    }

    /// Write the run's issues to the issues log
    fn write_issues_log(&self, issues: &[String], path: &Path) -> Result<()> {
        let context = format!(
            "Narration Log - voice {} ({})",
            self.config.speech.voice,
            self.config.speech.endpoint
        );
        FileManager::append_to_log_file(path, &context)?;
        for issue in issues {
            FileManager::append_to_log_file(path, issue)?;
        }
        Ok(())
    }

    // Format duration in a human-readable format (HH:MM:SS)
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
