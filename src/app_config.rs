use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::providers::nakdan::DEFAULT_NAKDAN_ENDPOINT;
use crate::providers::speech::DEFAULT_SPEECH_ENDPOINT;
use crate::synthesis::SchedulerSettings;
use crate::timeline::TimelineSettings;
use crate::vocalization::VocalizationSettings;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Vocalization (nikud) service settings
    #[serde(default)]
    pub vocalization: VocalizationConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Output audio settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Text preparation settings
    #[serde(default)]
    pub text: TextConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Dicta Nakdan service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VocalizationConfig {
    /// Service endpoint URL
    #[serde(default = "default_nakdan_endpoint")]
    pub endpoint: String,

    /// Text genre passed to the service
    #[serde(default = "default_genre")]
    pub genre: String,

    /// Words per batch request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of concurrent requests (batches and fallback words share it)
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    /// Batch request timeout in seconds
    #[serde(default = "default_vocalization_timeout_secs")]
    pub timeout_secs: u64,

    /// Single word fallback timeout in seconds
    #[serde(default = "default_word_timeout_secs")]
    pub word_timeout_secs: u64,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_vocalization_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for VocalizationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_nakdan_endpoint(),
            genre: default_genre(),
            batch_size: default_batch_size(),
            concurrent_requests: default_concurrent_requests(),
            timeout_secs: default_vocalization_timeout_secs(),
            word_timeout_secs: default_word_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_vocalization_backoff_ms(),
        }
    }
}

/// Speech synthesis service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpeechConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_speech_endpoint")]
    pub endpoint: String,

    /// API key for the service
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Model name (e.g., "tts-1", "tts-1-hd")
    #[serde(default = "default_speech_model")]
    pub model: String,

    /// Voice identifier
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Speaking rate change in percent (-50 is half speed, +100 double)
    #[serde(default)]
    pub rate: i32,

    /// Volume change in percent
    #[serde(default)]
    pub volume: i32,

    /// Maximum number of concurrent synthesis requests
    #[serde(default = "default_concurrent_requests")]
    pub max_concurrent: usize,

    /// Lower the concurrency when units start failing
    #[serde(default = "default_true")]
    pub adaptive_concurrency: bool,

    /// Request timeout in seconds
    #[serde(default = "default_speech_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff multiplier for retries (in milliseconds)
    #[serde(default = "default_speech_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: default_speech_endpoint(),
            api_key: String::new(),
            model: default_speech_model(),
            voice: default_voice(),
            rate: 0,
            volume: 0,
            max_concurrent: default_concurrent_requests(),
            adaptive_concurrency: true,
            timeout_secs: default_speech_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_speech_backoff_ms(),
        }
    }
}

impl SpeechConfig {
    /// Whether the endpoint points at this machine (no API key needed)
    pub fn is_local(&self) -> bool {
        Url::parse(&self.endpoint)
            .ok()
            .and_then(|url| url.host_str().map(|h| h == "localhost" || h == "127.0.0.1" || h == "::1"))
            .unwrap_or(false)
    }
}

/// Output audio configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AudioConfig {
    /// Frame rate of the assembled track
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Silence inserted after every spoken unit
    #[serde(default = "default_pause_sentence_ms")]
    pub pause_sentence_ms: u64,

    /// Silence standing in for an image
    #[serde(default = "default_image_dwell_ms")]
    pub image_dwell_ms: u64,

    /// Silence used for a unit that could not be synthesized
    #[serde(default = "default_fallback_silence_ms")]
    pub fallback_silence_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            pause_sentence_ms: default_pause_sentence_ms(),
            image_dwell_ms: default_image_dwell_ms(),
            fallback_silence_ms: default_fallback_silence_ms(),
        }
    }
}

/// Text preparation configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TextConfig {
    /// Replace dashes with spaces and drop bullets before synthesis
    #[serde(default = "default_true")]
    pub normalize_dashes: bool,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            normalize_dashes: true,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_nakdan_endpoint() -> String {
    DEFAULT_NAKDAN_ENDPOINT.to_string()
}

fn default_genre() -> String {
    "modern".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrent_requests() -> usize {
    5
}

fn default_vocalization_timeout_secs() -> u64 {
    30
}

fn default_word_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    2
}

fn default_vocalization_backoff_ms() -> u64 {
    500
}

fn default_speech_endpoint() -> String {
    DEFAULT_SPEECH_ENDPOINT.to_string()
}

fn default_speech_model() -> String {
    "tts-1".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_speech_timeout_secs() -> u64 {
    60
}

fn default_speech_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_sample_rate() -> u32 {
    24000
}

fn default_pause_sentence_ms() -> u64 {
    600
}

fn default_image_dwell_ms() -> u64 {
    4000
}

fn default_fallback_silence_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.vocalization.batch_size == 0 {
            return Err(anyhow!("vocalization.batch_size must be at least 1"));
        }
        if self.vocalization.concurrent_requests == 0 {
            return Err(anyhow!("vocalization.concurrent_requests must be at least 1"));
        }
        if self.speech.max_concurrent == 0 {
            return Err(anyhow!("speech.max_concurrent must be at least 1"));
        }
        if self.audio.sample_rate == 0 {
            return Err(anyhow!("audio.sample_rate must be greater than 0"));
        }
        if self.speech.voice.trim().is_empty() {
            return Err(anyhow!("speech.voice must not be empty"));
        }

        Url::parse(&self.vocalization.endpoint)
            .with_context(|| format!("Invalid vocalization endpoint: {}", self.vocalization.endpoint))?;
        Url::parse(&self.speech.endpoint)
            .with_context(|| format!("Invalid speech endpoint: {}", self.speech.endpoint))?;

        if self.speech.api_key.is_empty() && !self.speech.is_local() {
            return Err(anyhow!(
                "Speech API key is required for remote endpoint {}",
                self.speech.endpoint
            ));
        }

        Ok(())
    }

    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write this configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, config_json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))
    }
}

/// Settings for one job, taken from `Config` once at job creation
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub vocalization: VocalizationSettings,
    pub synthesis: SchedulerSettings,
    pub timeline: TimelineSettings,
    pub normalize_dashes: bool,
}

impl JobConfig {
    /// Override the synthesis concurrency limit
    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.synthesis.max_concurrent = max_concurrent;
        self
    }
}

impl From<&Config> for JobConfig {
    fn from(config: &Config) -> Self {
        Self {
            vocalization: VocalizationSettings {
                genre: config.vocalization.genre.clone(),
                batch_size: config.vocalization.batch_size,
                concurrent_requests: config.vocalization.concurrent_requests,
                batch_timeout: Duration::from_secs(config.vocalization.timeout_secs),
                word_timeout: Duration::from_secs(config.vocalization.word_timeout_secs),
                retry_count: config.vocalization.retry_count,
                retry_backoff_ms: config.vocalization.retry_backoff_ms,
            },
            synthesis: SchedulerSettings {
                max_concurrent: config.speech.max_concurrent,
                adaptive: config.speech.adaptive_concurrency,
                timeout: Duration::from_secs(config.speech.timeout_secs),
                retry_count: config.speech.retry_count,
                retry_backoff_ms: config.speech.retry_backoff_ms,
                fallback_silence_ms: config.audio.fallback_silence_ms,
                sample_rate: config.audio.sample_rate,
            },
            timeline: TimelineSettings {
                sample_rate: config.audio.sample_rate,
                pause_sentence_ms: config.audio.pause_sentence_ms,
                image_dwell_ms: config.audio.image_dwell_ms,
            },
            normalize_dashes: config.text.normalize_dashes,
        }
    }
}
