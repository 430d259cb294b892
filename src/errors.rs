/*!
 * Error types for the nikud-narrator application.
 *
 * This module contains custom error types for the different layers of the
 * narration pipeline, using the thiserror crate for ergonomic error definitions.
 * Only `JobError` ever reaches the caller of a job: provider and audio errors
 * are absorbed close to where they happen.
 */

use thiserror::Error;

/// Errors that can occur when working with remote provider APIs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The request did not finish in time
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The provider answered successfully but with no payload
    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether retrying the same request could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 429,
            Self::RequestFailed(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded(_)
            | Self::Timeout(_)
            | Self::EmptyResponse => true,
            Self::ParseError(_) | Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors raised while decoding, transforming or encoding audio
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Failed to encode audio: {0}")]
    Encode(String),

    #[error("Failed to resample audio: {0}")]
    Resample(String),

    #[error("Audio I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for AudioError {
    fn from(error: hound::Error) -> Self {
        match error {
            hound::Error::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}

/// Terminal failures of a narration job.
///
/// Everything else (network failures, batch mismatches, failed units) is
/// recovered inside the pipeline and never surfaces here.
#[derive(Error, Debug)]
pub enum JobError {
    /// The job was cancelled by its host
    #[error("Job cancelled")]
    Cancelled,

    /// Work could not even be scheduled (e.g. no concurrency available)
    #[error("Failed to schedule work: {0}")]
    Scheduling(String),

    /// The final audio or timeline could not be written
    #[error("Failed to persist output: {0}")]
    Persist(String),

    /// The job task itself died (panic or hard stop)
    #[error("Job terminated unexpectedly: {0}")]
    Internal(String),
}

impl From<AudioError> for JobError {
    fn from(error: AudioError) -> Self {
        Self::Persist(error.to_string())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from audio processing
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Error from a narration job
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    /// Configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
