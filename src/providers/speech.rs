use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::{Client, header};
use serde::Serialize;
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, status_error, transport_error};

/// Default OpenAI-compatible API base
pub const DEFAULT_SPEECH_ENDPOINT: &str = "https://api.openai.com/v1";

/// Client for an OpenAI-compatible `/audio/speech` endpoint
#[derive(Debug)]
pub struct Speech {
    /// API base URL, without the `/audio/speech` suffix
    endpoint: String,
    /// Model name sent with every request
    model: String,
    /// HTTP client carrying the auth headers
    client: Client,
}

/// Speech synthesis request
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak
    pub input: String,
    /// Voice identifier
    pub voice: String,
    /// Speed factor, 1.0 is normal
    pub speed: f32,
}

impl SpeechRequest {
    pub fn new(input: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            voice: voice.into(),
            speed: 1.0,
        }
    }

    pub fn speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }
}

/// Synthesized audio as returned by the provider (WAV bytes)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeechResponse {
    pub audio: Bytes,
}

/// Wire body for the speech endpoint
#[derive(Debug, Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
    speed: f32,
}

impl Speech {
    /// Create a new speech client
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<&str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = format!("Bearer {}", key)
                .parse()
                .map_err(|e| ProviderError::AuthenticationError(format!("Invalid API key: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .pool_max_idle_per_host(20)
            .build()
            .map_err(|e| ProviderError::ConnectionError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }
}

#[async_trait]
impl Provider for Speech {
    type Request = SpeechRequest;
    type Response = SpeechResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let body = SpeechBody {
            model: &self.model,
            input: &request.input,
            voice: &request.voice,
            response_format: "wav",
            speed: request.speed.clamp(0.25, 4.0),
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, error_text));
        }

        let audio = response.bytes().await.map_err(transport_error)?;
        if audio.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        debug!("Synthesized {} chars into {} bytes", request.input.chars().count(), audio.len());
        Ok(SpeechResponse { audio })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.endpoint))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text));
        }
        Ok(())
    }
}
