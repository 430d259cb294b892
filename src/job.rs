/*!
 * Narration jobs.
 *
 * A job takes one text from its host and turns it into an audio file and a
 * timeline. Everything the job needs from the host (dictionary, voice) is read
 * once when the job starts; afterwards the job only talks back through
 * progress and status reports.
 *
 * A `JobHandle` runs the job on its own task. Cancelling is cooperative first:
 * the token stops the scheduling loops and any in-flight request futures are
 * dropped. If the task has not finished within the grace period it is
 * aborted. A cancelled job never persists anything.
 */

use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app_config::JobConfig;
use crate::dictionary::Dictionary;
use crate::errors::JobError;
use crate::providers::Provider;
use crate::providers::nakdan::{NakdanRequest, NakdanResponse};
use crate::providers::speech::{SpeechRequest, SpeechResponse};
use crate::segmenter::TextSegmenter;
use crate::synthesis::{SkippedUnit, SynthesisScheduler, VoiceParams};
use crate::text_tools::normalize_for_speech;
use crate::timeline::{TimelineAssembler, persist_in_background};
use crate::vocalization::VocalizationBatchService;

/// Progress reached when vocalization is done
const VOCALIZATION_END: u8 = 40;
/// Progress reached when synthesis is done
const SYNTHESIS_END: u8 = 95;

/// What a job needs from whoever started it
pub trait JobHost: Send + Sync {
    /// Overall progress, 0 to 100
    fn report_progress(&self, percent: u8);

    /// Short human-readable status line
    fn report_status(&self, message: &str);

    /// Pronunciation dictionary, read once at job start
    fn dictionary(&self) -> Dictionary;

    /// Voice selection, read once at job start
    fn voice_params(&self) -> VoiceParams;
}

/// Input of one job
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub text: String,
    /// Audio path; the timeline goes next to it
    pub output: PathBuf,
    /// Whether to add nikud before synthesis
    pub vocalize: bool,
}

/// Successful result of one job
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub audio_path: PathBuf,
    pub timeline_path: PathBuf,
    /// Units that fell back to silence
    pub skipped: Vec<SkippedUnit>,
    pub unit_count: usize,
    pub duration_ms: u64,
    /// Set when vocalization failed as a whole and the text went out without nikud
    pub vocalization_error: Option<String>,
}

/// The full pipeline: vocalize, prepare, segment, synthesize, assemble, persist
#[derive(Debug)]
pub struct NarrationJob<N, S> {
    nakdan: Arc<N>,
    speech: Arc<S>,
    config: JobConfig,
}

impl<N, S> NarrationJob<N, S>
where
    N: Provider<Request = NakdanRequest, Response = NakdanResponse>,
    S: Provider<Request = SpeechRequest, Response = SpeechResponse>,
{
    pub fn new(nakdan: Arc<N>, speech: Arc<S>, config: JobConfig) -> Self {
        Self {
            nakdan,
            speech,
            config,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Run the job to completion or until `cancel` fires
    pub async fn run<H>(&self, request: &JobRequest, host: &H, cancel: &CancellationToken) -> Result<JobOutcome, JobError>
    where
        H: JobHost + ?Sized,
    {
        let overlay = host.dictionary().overlay();
        let voice = host.voice_params();
        host.report_progress(0);

        let mut text = request.text.clone();
        let mut vocalization_error = None;
        let synthesis_start = if request.vocalize { VOCALIZATION_END } else { 0 };

        if request.vocalize {
            host.report_status("Adding nikud");
            let service = VocalizationBatchService::new(Arc::clone(&self.nakdan), self.config.vocalization.clone());
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
                outcome = service.vocalize(&text, &overlay, |p| host.report_progress(scale(p, 0, VOCALIZATION_END))) => outcome,
            };

            if let Some(message) = &outcome.error {
                warn!("{}", message);
                host.report_status("Nikud failed, continuing with the original text");
            }
            vocalization_error = outcome.error;
            text = outcome.text;
        }

        let mut prepared = overlay.apply_protected(&text);
        if self.config.normalize_dashes {
            prepared = normalize_for_speech(&prepared);
        }

        let units = TextSegmenter::new().segment(&prepared);
        info!("Text split into {} units", units.len());
        host.report_status(&format!("Synthesizing {} units", units.len()));

        let scheduler = SynthesisScheduler::new(Arc::clone(&self.speech), self.config.synthesis.clone());
        let report = scheduler
            .synthesize(&units, &voice, cancel, |p| {
                host.report_progress(scale(p, synthesis_start, SYNTHESIS_END))
            })
            .await?;

        host.report_status("Assembling audio");
        let track = TimelineAssembler::new(self.config.timeline.clone()).assemble(&units, report.results)?;
        let duration_ms = track.duration_ms();

        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        host.report_status("Saving");
        let timeline_path = persist_in_background(track, request.output.clone(), cancel.clone()).await?;

        if !report.skipped.is_empty() {
            warn!("{} units fell back to silence", report.skipped.len());
        }
        host.report_progress(100);
        host.report_status("Done");

        Ok(JobOutcome {
            audio_path: request.output.clone(),
            timeline_path,
            skipped: report.skipped,
            unit_count: units.len(),
            duration_ms,
            vocalization_error,
        })
    }
}

/// Map a phase-local percentage onto the overall range `[from, to]`
fn scale(percent: u8, from: u8, to: u8) -> u8 {
    let percent = percent.min(100) as u16;
    (from as u16 + percent * (to.saturating_sub(from)) as u16 / 100) as u8
}

/// A job running on its own task
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<Result<JobOutcome, JobError>>,
}

impl JobHandle {
    /// Start `job` on a new task
    pub fn spawn<N, S, H>(job: NarrationJob<N, S>, request: JobRequest, host: Arc<H>) -> Self
    where
        N: Provider<Request = NakdanRequest, Response = NakdanResponse> + 'static,
        S: Provider<Request = SpeechRequest, Response = SpeechResponse> + 'static,
        H: JobHost + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            debug!("Job {} started for {}", id, request.output.display());
            let result = job.run(&request, host.as_ref(), &token).await;
            match &result {
                Ok(outcome) => info!("Job {} finished: {} units", id, outcome.unit_count),
                Err(e) => error!("Job {} failed: {}", id, e),
            }
            result
        });

        Self { id, cancel, task }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A token that cancels this job when triggered
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job's single terminal result
    pub async fn wait(self) -> Result<JobOutcome, JobError> {
        join_result(self.task.await)
    }

    /// Cancel the job, aborting its task if it does not stop within `grace`
    pub async fn cancel(self, grace: Duration) -> Result<JobOutcome, JobError> {
        self.cancel.cancel();
        stop(self.id, self.task, grace).await
    }

    /// Wait for the job, cancelling it if `shutdown` fires first
    pub async fn wait_or_cancel(self, shutdown: &CancellationToken, grace: Duration) -> Result<JobOutcome, JobError> {
        let Self { id, cancel, mut task } = self;

        tokio::select! {
            joined = &mut task => join_result(joined),
            _ = shutdown.cancelled() => {
                info!("Cancelling job {}", id);
                cancel.cancel();
                stop(id, task, grace).await
            }
        }
    }
}

async fn stop(
    id: Uuid,
    mut task: JoinHandle<Result<JobOutcome, JobError>>,
    grace: Duration,
) -> Result<JobOutcome, JobError> {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(joined) => join_result(joined),
        Err(_) => {
            warn!("Job {} did not stop within {:?}, aborting", id, grace);
            task.abort();
            let _ = task.await;
            Err(JobError::Cancelled)
        }
    }
}

fn join_result(joined: Result<Result<JobOutcome, JobError>, tokio::task::JoinError>) -> Result<JobOutcome, JobError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(JobError::Cancelled),
        Err(e) => Err(JobError::Internal(e.to_string())),
    }
}

/// Reports sent by a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Progress(u8),
    Status(String),
}

/// A host that forwards reports over a channel
#[derive(Debug, Clone)]
pub struct ChannelHost {
    dictionary: Dictionary,
    voice: VoiceParams,
    events: UnboundedSender<JobEvent>,
}

impl ChannelHost {
    pub fn new(dictionary: Dictionary, voice: VoiceParams) -> (Self, UnboundedReceiver<JobEvent>) {
        let (events, receiver) = unbounded_channel();
        (
            Self {
                dictionary,
                voice,
                events,
            },
            receiver,
        )
    }
}

impl JobHost for ChannelHost {
    fn report_progress(&self, percent: u8) {
        // The receiver may be gone already; reports are best effort
        let _ = self.events.send(JobEvent::Progress(percent));
    }

    fn report_status(&self, message: &str) {
        let _ = self.events.send(JobEvent::Status(message.to_string()));
    }

    fn dictionary(&self) -> Dictionary {
        self.dictionary.clone()
    }

    fn voice_params(&self) -> VoiceParams {
        self.voice.clone()
    }
}
