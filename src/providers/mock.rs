/*!
 * Mock provider implementations for testing.
 *
 * `MockNakdan` stands in for the vocalization API and `MockSpeech` for the
 * speech endpoint. Both have scriptable behaviours, and clones share their
 * call counters so a test can hand one clone to the code under test and
 * inspect the other.
 */

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::audio::AudioClip;
use crate::errors::ProviderError;
use crate::providers::Provider;
use crate::providers::nakdan::{NakdanRequest, NakdanResponse, NakdanToken};
use crate::providers::speech::{SpeechRequest, SpeechResponse};

/// Behavior mode for the mock vocalizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockNakdanBehavior {
    /// Vocalizes every word it receives
    Working,
    /// Multi-word requests come back with this many words missing
    DropWords { count: usize },
    /// Multi-word requests fail, single words succeed
    FailingBatches,
    /// Every request fails
    Failing,
    /// Every request panics
    Panicking,
    /// Works, after a delay
    Slow { delay_ms: u64 },
}

/// Mock vocalizer
#[derive(Debug, Clone)]
pub struct MockNakdan {
    behavior: MockNakdanBehavior,
    vocalize: fn(&str) -> String,
    batch_calls: Arc<AtomicUsize>,
    word_calls: Arc<AtomicUsize>,
}

/// Default vocalization: a patah after the first letter
fn add_patah(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => format!("{}\u{05B7}{}", first, chars.as_str()),
        None => String::new(),
    }
}

impl MockNakdan {
    pub fn new(behavior: MockNakdanBehavior) -> Self {
        Self {
            behavior,
            vocalize: add_patah,
            batch_calls: Arc::new(AtomicUsize::new(0)),
            word_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(MockNakdanBehavior::Working)
    }

    pub fn dropping_words(count: usize) -> Self {
        Self::new(MockNakdanBehavior::DropWords { count })
    }

    pub fn failing_batches() -> Self {
        Self::new(MockNakdanBehavior::FailingBatches)
    }

    pub fn failing() -> Self {
        Self::new(MockNakdanBehavior::Failing)
    }

    pub fn panicking() -> Self {
        Self::new(MockNakdanBehavior::Panicking)
    }

    /// Set how each word is vocalized
    pub fn with_vocalizer(mut self, vocalize: fn(&str) -> String) -> Self {
        self.vocalize = vocalize;
        self
    }

    /// Requests that carried more than one word
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Requests that carried exactly one word
    pub fn word_calls(&self) -> usize {
        self.word_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, words: &[&str], drop: usize) -> NakdanResponse {
        let keep = words.len().saturating_sub(drop);
        let mut tokens = Vec::new();
        for (i, word) in words.iter().take(keep).enumerate() {
            if i > 0 {
                tokens.push(NakdanToken {
                    word: " ".to_string(),
                    options: Vec::new(),
                });
            }
            tokens.push(NakdanToken {
                word: word.to_string(),
                options: vec![(self.vocalize)(word)],
            });
        }
        NakdanResponse::new(tokens)
    }
}

#[async_trait]
impl Provider for MockNakdan {
    type Request = NakdanRequest;
    type Response = NakdanResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let words: Vec<&str> = request.data().split_whitespace().collect();
        let is_batch = words.len() > 1;
        if is_batch {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.word_calls.fetch_add(1, Ordering::SeqCst);
        }

        match self.behavior {
            MockNakdanBehavior::Working => Ok(self.respond(&words, 0)),
            MockNakdanBehavior::DropWords { count } => {
                Ok(self.respond(&words, if is_batch { count } else { 0 }))
            }
            MockNakdanBehavior::FailingBatches if is_batch => Err(ProviderError::ApiError {
                status_code: 502,
                message: "Simulated batch failure".to_string(),
            }),
            MockNakdanBehavior::FailingBatches => Ok(self.respond(&words, 0)),
            MockNakdanBehavior::Failing => Err(ProviderError::ConnectionError(
                "Simulated vocalizer outage".to_string(),
            )),
            MockNakdanBehavior::Panicking => panic!("Simulated vocalizer panic"),
            MockNakdanBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.respond(&words, 0))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockNakdanBehavior::Failing => Err(ProviderError::ConnectionError("offline".into())),
            _ => Ok(()),
        }
    }
}

/// Behavior mode for the mock speech provider
#[derive(Debug, Clone, PartialEq)]
pub enum MockSpeechBehavior {
    /// Always returns audio
    Working,
    /// Fails for any input containing the given text
    FailOn(String),
    /// Fails every Nth request; 0 never fails
    Intermittent { fail_every: usize },
    /// Returns a valid response with no audio
    Empty,
    /// Always fails
    Failing,
    /// Works after a random delay up to the given bound
    Jittered { max_delay_ms: u64 },
    /// Works after a fixed delay
    Slow { delay_ms: u64 },
}

/// Mock speech provider producing silent WAV audio
#[derive(Debug, Clone)]
pub struct MockSpeech {
    behavior: MockSpeechBehavior,
    /// Milliseconds of audio per input character
    ms_per_char: u64,
    sample_rate: u32,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl MockSpeech {
    pub fn new(behavior: MockSpeechBehavior) -> Self {
        Self {
            behavior,
            ms_per_char: 10,
            sample_rate: 24000,
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockSpeechBehavior::Working)
    }

    pub fn failing_on(text: impl Into<String>) -> Self {
        Self::new(MockSpeechBehavior::FailOn(text.into()))
    }

    pub fn failing() -> Self {
        Self::new(MockSpeechBehavior::Failing)
    }

    pub fn empty() -> Self {
        Self::new(MockSpeechBehavior::Empty)
    }

    pub fn jittered(max_delay_ms: u64) -> Self {
        Self::new(MockSpeechBehavior::Jittered { max_delay_ms })
    }

    /// Frame rate of the produced audio
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Audio length per input character
    pub fn with_ms_per_char(mut self, ms_per_char: u64) -> Self {
        self.ms_per_char = ms_per_char;
        self
    }

    /// Audio length the mock produces for an input
    pub fn expected_duration_ms(&self, input: &str) -> u64 {
        input.chars().count() as u64 * self.ms_per_char
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Every input received, in arrival order
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    fn audio_for(&self, input: &str) -> Result<SpeechResponse, ProviderError> {
        let clip = AudioClip::silence(self.expected_duration_ms(input), self.sample_rate);
        let wav = clip
            .to_wav_bytes()
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(SpeechResponse {
            audio: Bytes::from(wav),
        })
    }

    async fn respond(&self, request: &SpeechRequest, count: usize) -> Result<SpeechResponse, ProviderError> {
        match &self.behavior {
            MockSpeechBehavior::Working => self.audio_for(&request.input),
            MockSpeechBehavior::FailOn(text) if request.input.contains(text.as_str()) => {
                Err(ProviderError::ApiError {
                    status_code: 500,
                    message: format!("Simulated failure for '{}'", request.input),
                })
            }
            MockSpeechBehavior::FailOn(_) => self.audio_for(&request.input),
            MockSpeechBehavior::Intermittent { fail_every } => {
                if *fail_every > 0 && count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        status_code: 503,
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                    })
                } else {
                    self.audio_for(&request.input)
                }
            }
            MockSpeechBehavior::Empty => Ok(SpeechResponse::default()),
            MockSpeechBehavior::Failing => Err(ProviderError::ConnectionError(
                "Simulated speech outage".to_string(),
            )),
            MockSpeechBehavior::Jittered { max_delay_ms } => {
                let delay = rand::rng().random_range(0..=*max_delay_ms);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                self.audio_for(&request.input)
            }
            MockSpeechBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                self.audio_for(&request.input)
            }
        }
    }
}

/// Decrements the in-flight counter even when the request future is dropped
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provider for MockSpeech {
    type Request = SpeechRequest;
    type Response = SpeechResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().push(request.input.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        // Give other requests a chance to overlap
        tokio::task::yield_now().await;
        self.respond(&request, count).await
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockSpeechBehavior::Failing => Err(ProviderError::ConnectionError("offline".into())),
            _ => Ok(()),
        }
    }
}
