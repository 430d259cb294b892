/*!
 * Provider implementations for the remote services the narrator talks to.
 *
 * This module contains client implementations for:
 * - Nakdan: Dicta's Hebrew vocalization API
 * - Speech: an OpenAI-compatible text-to-speech endpoint
 * - Mock: scriptable test doubles for both
 */

use async_trait::async_trait;
use rand::Rng;
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::ProviderError;

/// Common trait for all remote providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing real clients and test doubles to be used interchangeably by the
/// vocalization service and the synthesis scheduler.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::AuthenticationError(body),
        429 => ProviderError::RateLimitExceeded(body),
        code => ProviderError::ApiError {
            status_code: code,
            message: body,
        },
    }
}

/// Exponential backoff for the given retry attempt (1-based), with a little jitter
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exponent);
    let jitter = if base_ms > 1 {
        rand::rng().random_range(0..base_ms / 2)
    } else {
        0
    };
    Duration::from_millis(delay.saturating_add(jitter))
}

/// Longest delay `backoff_delay` can return for an attempt
pub fn backoff_ceiling(base_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(1u64 << exponent).saturating_add(base_ms / 2))
}

/// Map a reqwest transport error to a provider error
pub(crate) fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(0)
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

pub mod nakdan;
pub mod speech;
pub mod mock;
