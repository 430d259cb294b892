/*!
 * Bounded-concurrency speech synthesis over segmented units.
 *
 * Scheduling is a sliding window: a FIFO of pending speakable units and a set
 * of in-flight requests. Each time a request finishes its result goes into the
 * slot of its unit and the next pending unit is started at once, so the pool
 * stays full without ever exceeding the limit.
 *
 * Marker units and punctuation-only units are resolved on the spot and never
 * take a slot. A unit whose synthesis fails, even after retries, becomes a
 * short silence and is listed in the skipped-units report.
 */

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioClip;
use crate::errors::{JobError, ProviderError};
use crate::providers::speech::{SpeechRequest, SpeechResponse};
use crate::providers::{Provider, backoff_delay};
use crate::segmenter::TextUnit;

pub mod adaptive;

pub use adaptive::AdaptiveLimit;

/// Tuning for one synthesis run
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    /// Upper bound on requests in flight
    pub max_concurrent: usize,
    /// Back off the limit when units fail
    pub adaptive: bool,
    /// Per-request timeout
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
    /// Length of the silence that replaces a failed unit
    pub fallback_silence_ms: u64,
    /// Frame rate of generated silence
    pub sample_rate: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            adaptive: true,
            timeout: Duration::from_secs(60),
            retry_count: 2,
            retry_backoff_ms: 1000,
            fallback_silence_ms: 500,
            sample_rate: 24000,
        }
    }
}

/// Voice selection and prosody for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceParams {
    pub voice: String,
    /// Rate change in percent
    pub rate: i32,
    /// Volume change in percent
    pub volume: i32,
}

impl VoiceParams {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            rate: 0,
            volume: 0,
        }
    }

    /// Provider speed factor for the rate
    pub fn speed(&self) -> f32 {
        (1.0 + self.rate as f32 / 100.0).clamp(0.25, 4.0)
    }

    /// Linear gain for the volume
    pub fn gain(&self) -> f32 {
        (1.0 + self.volume as f32 / 100.0).max(0.0)
    }
}

/// How a unit was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStatus {
    Success,
    FallbackSilence,
}

/// Audio for one unit
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub index: usize,
    /// `None` for marker units, whose audio is decided at assembly
    pub audio: Option<AudioClip>,
    pub status: SynthesisStatus,
}

/// A unit that fell back to silence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUnit {
    pub index: usize,
    pub text: String,
}

/// Everything the scheduler produced, one result per unit in unit order
#[derive(Debug, Clone, Default)]
pub struct SynthesisReport {
    pub results: Vec<SynthesisResult>,
    pub skipped: Vec<SkippedUnit>,
}

/// Runs speech synthesis over a unit sequence
#[derive(Debug)]
pub struct SynthesisScheduler<P> {
    provider: Arc<P>,
    settings: SchedulerSettings,
}

impl<P> SynthesisScheduler<P>
where
    P: Provider<Request = SpeechRequest, Response = SpeechResponse>,
{
    pub fn new(provider: Arc<P>, settings: SchedulerSettings) -> Self {
        Self { provider, settings }
    }

    /// Synthesize every unit.
    ///
    /// Unit failures never surface here. The only errors are a limit that
    /// cannot schedule anything and cancellation through `cancel`.
    pub async fn synthesize<F>(
        &self,
        units: &[TextUnit],
        voice: &VoiceParams,
        cancel: &CancellationToken,
        progress: F,
    ) -> Result<SynthesisReport, JobError>
    where
        F: Fn(u8) + Send + Sync,
    {
        if self.settings.max_concurrent == 0 {
            return Err(JobError::Scheduling(
                "synthesis concurrency limit is 0".to_string(),
            ));
        }

        let total = units.len();
        let mut slots: Vec<Option<SynthesisResult>> = vec![None; total];
        let mut skipped = Vec::new();
        let mut completed = 0usize;
        let report_progress = |completed: usize| {
            progress((completed * 100 / total.max(1)) as u8);
        };

        // Positions of the units that need the provider
        let mut pending = VecDeque::new();
        for (position, unit) in units.iter().enumerate() {
            if !unit.is_speakable() {
                slots[position] = Some(SynthesisResult {
                    index: unit.index,
                    audio: None,
                    status: SynthesisStatus::Success,
                });
            } else if unit.is_punctuation_only() {
                slots[position] = Some(SynthesisResult {
                    index: unit.index,
                    audio: Some(AudioClip::empty(self.settings.sample_rate)),
                    status: SynthesisStatus::Success,
                });
            } else {
                pending.push_back(position);
                continue;
            }
            completed += 1;
            report_progress(completed);
        }

        info!(
            "Synthesizing {} of {} units with up to {} requests in flight",
            pending.len(),
            total,
            self.settings.max_concurrent
        );

        let mut limit = AdaptiveLimit::new(self.settings.max_concurrent, self.settings.adaptive);
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit.current() {
                let Some(position) = pending.pop_front() else {
                    break;
                };
                in_flight.push(self.synthesize_unit(position, units[position].speech_text(), voice));
            }
            if in_flight.is_empty() {
                break;
            }

            let (position, outcome) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Synthesis cancelled with {} requests in flight", in_flight.len());
                    return Err(JobError::Cancelled);
                }
                Some(finished) = in_flight.next() => finished,
            };

            let index = units[position].index;
            let result = match outcome {
                Ok(clip) => {
                    limit.on_success();
                    SynthesisResult {
                        index,
                        audio: Some(clip),
                        status: SynthesisStatus::Success,
                    }
                }
                Err(e) => {
                    limit.on_failure();
                    warn!(
                        "Unit {} fell back to silence: {} (limit now {})",
                        index,
                        e,
                        limit.current()
                    );
                    skipped.push(SkippedUnit {
                        index,
                        text: units[position].speech_text().to_string(),
                    });
                    SynthesisResult {
                        index,
                        audio: Some(AudioClip::silence(
                            self.settings.fallback_silence_ms,
                            self.settings.sample_rate,
                        )),
                        status: SynthesisStatus::FallbackSilence,
                    }
                }
            };
            slots[position] = Some(result);
            completed += 1;
            report_progress(completed);
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.ok_or_else(|| JobError::Internal(format!("unit {} was never resolved", position)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        skipped.sort_by_key(|unit| unit.index);
        info!("Synthesis finished: {} units, {} skipped", total, skipped.len());
        Ok(SynthesisReport { results, skipped })
    }

    /// Synthesize one unit with retries. Returns the unit position alongside the outcome.
    async fn synthesize_unit(
        &self,
        position: usize,
        text: &str,
        voice: &VoiceParams,
    ) -> (usize, Result<AudioClip, ProviderError>) {
        let mut attempt = 0;

        loop {
            let request = SpeechRequest::new(text, voice.voice.as_str()).speed(voice.speed());
            let result = match tokio::time::timeout(self.settings.timeout, self.provider.complete(request)).await {
                Ok(Ok(response)) => decode(&response, voice),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProviderError::Timeout(self.settings.timeout.as_millis() as u64)),
            };

            match result {
                Ok(clip) => return (position, Ok(clip)),
                Err(e) if e.is_retryable() && attempt < self.settings.retry_count => {
                    attempt += 1;
                    debug!(
                        "Unit {} failed: {} - retry {}/{}",
                        position, e, attempt, self.settings.retry_count
                    );
                    tokio::time::sleep(backoff_delay(self.settings.retry_backoff_ms, attempt)).await;
                }
                Err(e) => return (position, Err(e)),
            }
        }
    }
}

fn decode(response: &SpeechResponse, voice: &VoiceParams) -> Result<AudioClip, ProviderError> {
    if response.audio.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    let mut clip = AudioClip::from_wav_bytes(&response.audio)
        .map_err(|e| ProviderError::ParseError(e.to_string()))?;
    if clip.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    clip.apply_gain(voice.gain());
    Ok(clip)
}
