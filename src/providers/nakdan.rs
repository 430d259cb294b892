use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{Provider, backoff_delay, status_error, transport_error};
use crate::text_tools::clean_dagesh;

/// Public Dicta Nakdan endpoint
pub const DEFAULT_NAKDAN_ENDPOINT: &str = "https://nakdan-2-0.loadbalancer.dicta.org.il/api";

/// Nakdan client for the Dicta vocalization API
#[derive(Debug)]
pub struct Nakdan {
    /// Full URL of the API
    endpoint: String,
    /// HTTP client for making requests
    client: Client,
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
}

/// Vocalization request for the Nakdan API
#[derive(Debug, Clone, Serialize)]
pub struct NakdanRequest {
    /// Always "nakdan"
    task: String,
    /// Space-joined words to vocalize
    data: String,
    /// Text genre the model is tuned for
    genre: String,
    keepqq: bool,
    nodageshdefekt: bool,
    kamatzdefekt: bool,
    allways: bool,
    optimizer: bool,
    /// Per-request timeout, not sent over the wire
    #[serde(skip)]
    timeout: Option<Duration>,
}

impl NakdanRequest {
    /// Create a new request for the given words
    pub fn new(data: impl Into<String>, genre: impl Into<String>) -> Self {
        Self {
            task: "nakdan".to_string(),
            data: data.into(),
            genre: genre.into(),
            keepqq: false,
            nodageshdefekt: false,
            kamatzdefekt: false,
            allways: false,
            optimizer: true,
            timeout: None,
        }
    }

    /// Limit how long this request may take
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The text being vocalized
    pub fn data(&self) -> &str {
        &self.data
    }
}

/// A single token of a Nakdan response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NakdanToken {
    /// The token as it appeared in the input
    #[serde(default)]
    pub word: String,
    /// Candidate vocalizations, best first
    #[serde(default)]
    pub options: Vec<String>,
}

impl NakdanToken {
    /// The preferred form: the first option with separators stripped, or the bare word
    pub fn preferred(&self) -> String {
        match self.options.first() {
            Some(option) => option.replace('|', "").trim().to_string(),
            None => self.word.clone(),
        }
    }
}

/// Vocalization response: the ordered token list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct NakdanResponse {
    pub tokens: Vec<NakdanToken>,
}

impl NakdanResponse {
    pub fn new(tokens: Vec<NakdanToken>) -> Self {
        Self { tokens }
    }

    /// The vocalized words in order, dagesh-cleaned, with separator tokens dropped
    pub fn words(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|token| clean_dagesh(&token.preferred()))
            .filter(|word| !word.trim().is_empty())
            .collect()
    }
}

impl Nakdan {
    /// Create a new client for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::new_with_config(endpoint, Duration::from_secs(30), 2, 500)
    }

    /// Create a new client with retry configuration
    pub fn new_with_config(
        endpoint: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::builder()
                .timeout(timeout)
                .pool_idle_timeout(Duration::from_secs(90))
                .pool_max_idle_per_host(20)
                .build()
                .unwrap_or_default(),
            max_retries,
            backoff_base_ms,
        }
    }

    async fn send_once(&self, request: &NakdanRequest) -> Result<NakdanResponse, ProviderError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(header::CONTENT_TYPE, "application/json;charset=UTF-8")
            .json(request);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            return Err(status_error(status, error_text));
        }

        let response_text = response.text().await.map_err(transport_error)?;
        serde_json::from_str::<NakdanResponse>(&response_text).map_err(|e| {
            let preview: String = response_text.chars().take(200).collect();
            ProviderError::ParseError(format!("{} (response starts with: {})", e, preview))
        })
    }
}

#[async_trait]
impl Provider for Nakdan {
    type Request = NakdanRequest;
    type Response = NakdanResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let mut attempt = 0;

        loop {
            match self.send_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Nakdan request failed: {} - retry {}/{}",
                        e, attempt, self.max_retries
                    );
                    tokio::time::sleep(backoff_delay(self.backoff_base_ms, attempt)).await;
                }
                Err(e) => {
                    error!("Nakdan request failed after {} attempts: {}", attempt + 1, e);
                    return Err(e);
                }
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let request = NakdanRequest::new("שלום", "modern").timeout(Duration::from_secs(10));
        let response = self.send_once(&request).await?;
        if response.words().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        debug!("Nakdan connection OK ({})", self.endpoint);
        Ok(())
    }
}
