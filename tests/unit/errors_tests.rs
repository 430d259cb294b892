/*!
 * Tests for error types and their conversions
 */

use nikud_narrator::errors::{AppError, AudioError, JobError, ProviderError};

/// Test which provider errors are worth retrying
#[test]
fn test_providerError_isRetryable_shouldSeparateTransientFromPermanent() {
    assert!(ProviderError::Timeout(1000).is_retryable());
    assert!(ProviderError::ConnectionError("reset".into()).is_retryable());
    assert!(ProviderError::ApiError { status_code: 503, message: String::new() }.is_retryable());
    assert!(ProviderError::EmptyResponse.is_retryable());

    assert!(!ProviderError::ApiError { status_code: 400, message: String::new() }.is_retryable());
    assert!(!ProviderError::AuthenticationError("bad key".into()).is_retryable());
    assert!(!ProviderError::ParseError("garbage".into()).is_retryable());
}

/// Test that audio failures at the end of a job are persist failures
#[test]
fn test_jobError_fromAudioError_shouldBePersist() {
    let error: JobError = AudioError::Encode("disk full".into()).into();
    assert!(matches!(error, JobError::Persist(message) if message.contains("disk full")));
}

/// Test error display strings
#[test]
fn test_errors_display_shouldIncludeDetails() {
    let error = ProviderError::ApiError { status_code: 502, message: "bad gateway".into() };
    assert_eq!(error.to_string(), "API responded with error: 502 - bad gateway");

    let app_error: AppError = JobError::Cancelled.into();
    assert_eq!(app_error.to_string(), "Job error: Job cancelled");
}
