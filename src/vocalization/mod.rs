/*!
 * Batched Hebrew vocalization.
 *
 * The service sends the Hebrew words of a text to the Nakdan API in fixed-size
 * batches, all in flight at once under one shared concurrency limit. A batch
 * whose answer does not have exactly one word per word sent is thrown away
 * and every word in it is asked for again on its own, through the same limit.
 *
 * Markers are masked for the whole run and the pronunciation dictionary is
 * applied last, so user entries always win over the remote vocalization.
 */

use futures::FutureExt;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::dictionary::DictionaryOverlay;
use crate::errors::ProviderError;
use crate::markers::TokenMasker;
use crate::providers::{Provider, backoff_ceiling};
use crate::providers::nakdan::{NakdanRequest, NakdanResponse};

pub mod tokens;

pub use tokens::{Piece, TokenizedText};

/// Share of the progress range covered by the batch requests
const BATCH_PROGRESS_SHARE: usize = 90;

/// Tuning for one vocalization run
#[derive(Debug, Clone, PartialEq)]
pub struct VocalizationSettings {
    pub genre: String,
    pub batch_size: usize,
    pub concurrent_requests: usize,
    /// Per-attempt timeout of a batch request
    pub batch_timeout: Duration,
    /// Per-attempt timeout of a single-word request
    pub word_timeout: Duration,
    /// Retries the Nakdan client makes after a failed attempt
    pub retry_count: u32,
    pub retry_backoff_ms: u64,
}

impl Default for VocalizationSettings {
    fn default() -> Self {
        Self {
            genre: "modern".to_string(),
            batch_size: 100,
            concurrent_requests: 5,
            batch_timeout: Duration::from_secs(30),
            word_timeout: Duration::from_secs(10),
            retry_count: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl VocalizationSettings {
    /// Upper bound for one request including every retry the client may make
    pub fn request_budget(&self, per_attempt: Duration) -> Duration {
        let backoff: Duration = (1..=self.retry_count)
            .map(|attempt| backoff_ceiling(self.retry_backoff_ms, attempt))
            .sum();
        per_attempt * (self.retry_count + 1) + backoff
    }
}

/// Result of a vocalization run. `text` is always usable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VocalizationOutcome {
    /// Vocalized text, or the input unchanged when `error` is set
    pub text: String,
    /// Set when the run failed as a whole
    pub error: Option<String>,
    /// Hebrew words sent
    pub word_count: usize,
    /// Batches whose answer was discarded
    pub failed_batches: usize,
    /// Words that were requested individually
    pub fallback_words: usize,
}

/// Result of one batch after validation and fallback
struct BatchResult {
    index: usize,
    words: Vec<String>,
    fell_back: bool,
}

/// Vocalizes text through a Nakdan-compatible provider
#[derive(Debug)]
pub struct VocalizationBatchService<P> {
    provider: Arc<P>,
    settings: VocalizationSettings,
}

impl<P> VocalizationBatchService<P>
where
    P: Provider<Request = NakdanRequest, Response = NakdanResponse>,
{
    pub fn new(provider: Arc<P>, settings: VocalizationSettings) -> Self {
        Self { provider, settings }
    }

    /// Vocalize `text` and apply the dictionary overlay.
    ///
    /// Never fails: if anything goes wrong as a whole the original text comes
    /// back with `error` set. `progress` receives percentages from 0 to 100.
    pub async fn vocalize<F>(&self, text: &str, overlay: &DictionaryOverlay, progress: F) -> VocalizationOutcome
    where
        F: Fn(u8) + Send + Sync,
    {
        match AssertUnwindSafe(self.run(text, overlay, &progress)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Vocalization aborted, keeping original text: {}", message);
                VocalizationOutcome {
                    text: text.to_string(),
                    error: Some(format!("Vocalization failed: {}", message)),
                    ..Default::default()
                }
            }
        }
    }

    async fn run<F>(&self, text: &str, overlay: &DictionaryOverlay, progress: &F) -> VocalizationOutcome
    where
        F: Fn(u8) + Send + Sync,
    {
        let masked = TokenMasker::for_markers().mask(text);
        let tokenized = TokenizedText::new(&masked.text);
        let words = tokenized.words();

        let batch_size = self.settings.batch_size.max(1);
        let batches: Vec<&[&str]> = words.chunks(batch_size).collect();
        let total_batches = batches.len();
        info!(
            "Vocalizing {} Hebrew words in {} batches",
            words.len(),
            total_batches
        );

        let concurrency = self.settings.concurrent_requests.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let completed = AtomicUsize::new(0);

        let mut results: Vec<BatchResult> = stream::iter(batches.into_iter().enumerate())
            .map(|(index, batch)| {
                let semaphore = Arc::clone(&semaphore);
                let completed = &completed;
                async move {
                    let result = self.vocalize_batch(index, batch, &semaphore).await;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress((done * BATCH_PROGRESS_SHARE / total_batches) as u8);
                    result
                }
            })
            .boxed()
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by_key(|result| result.index);
        let failed_batches = results.iter().filter(|r| r.fell_back).count();
        let fallback_words = results
            .iter()
            .filter(|r| r.fell_back)
            .map(|r| r.words.len())
            .sum();
        let vocalized: Vec<String> = results.into_iter().flat_map(|r| r.words).collect();

        let reassembled = tokenized.reassemble(&vocalized);
        let overlaid = overlay.apply(&reassembled);
        let output = masked.unmask(&overlaid);
        progress(100);

        if failed_batches > 0 {
            warn!(
                "{} of {} batches fell back to single words ({} words)",
                failed_batches, total_batches, fallback_words
            );
        }

        VocalizationOutcome {
            text: output,
            error: None,
            word_count: words.len(),
            failed_batches,
            fallback_words,
        }
    }

    async fn vocalize_batch(&self, index: usize, batch: &[&str], semaphore: &Semaphore) -> BatchResult {
        let request = NakdanRequest::new(batch.join(" "), self.settings.genre.as_str());

        let response = {
            let _permit = semaphore.acquire().await;
            self.request_with_timeout(request, self.settings.batch_timeout).await
        };

        match response {
            Ok(response) => {
                let words = response.words();
                if words.len() == batch.len() {
                    debug!("Batch {} vocalized ({} words)", index + 1, words.len());
                    return BatchResult {
                        index,
                        words,
                        fell_back: false,
                    };
                }
                warn!(
                    "Batch {} mismatch: sent {} words, got {}. Falling back to single words",
                    index + 1,
                    batch.len(),
                    words.len()
                );
            }
            Err(e) => {
                warn!("Batch {} failed: {}. Falling back to single words", index + 1, e);
            }
        }

        let words = join_all(batch.iter().map(|word| self.vocalize_word(word, semaphore))).await;
        BatchResult {
            index,
            words,
            fell_back: true,
        }
    }

    /// Vocalize one word on its own; the original word is kept on any failure
    async fn vocalize_word(&self, word: &str, semaphore: &Semaphore) -> String {
        let request = NakdanRequest::new(word, self.settings.genre.as_str());
        let _permit = semaphore.acquire().await;

        match self.request_with_timeout(request, self.settings.word_timeout).await {
            Ok(response) => response
                .words()
                .into_iter()
                .next()
                .unwrap_or_else(|| word.to_string()),
            Err(e) => {
                debug!("Word '{}' kept unvocalized: {}", word, e);
                word.to_string()
            }
        }
    }

    async fn request_with_timeout(
        &self,
        request: NakdanRequest,
        timeout: Duration,
    ) -> Result<NakdanResponse, ProviderError> {
        let request = request.timeout(timeout);
        let budget = self.settings.request_budget(timeout);
        match tokio::time::timeout(budget, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(budget.as_millis() as u64)),
        }
    }
}
