/*!
 * Track and timeline assembly.
 *
 * The assembler walks the units in their original order, appends each unit's
 * audio to one track, and records where every unit sits on that track. The timeline is what an external player uses to
 * highlight text and turn pages while the audio plays.
 *
 * Persisted output is the audio file at the caller's path and the timeline as
 * JSON next to it, same name with a `.json` extension.
 */

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioClip, TrackBuilder};
use crate::errors::JobError;
use crate::segmenter::{TextUnit, UnitKind};
use crate::synthesis::SynthesisResult;

/// Timing settings for assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineSettings {
    /// Canonical frame rate of the track
    pub sample_rate: u32,
    /// Gap after every spoken unit
    pub pause_sentence_ms: u64,
    /// How long an image stays on screen
    pub image_dwell_ms: u64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            pause_sentence_ms: 600,
            image_dwell_ms: 4000,
        }
    }
}

/// One timeline record, in the player's JSON shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub index: usize,
    pub text: String,
    #[serde(rename = "start")]
    pub start_ms: u64,
    #[serde(rename = "end")]
    pub end_ms: u64,
    pub is_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_trigger: Option<u32>,
}

/// The assembled audio and its timeline
#[derive(Debug, Clone)]
pub struct AssembledTrack {
    pub audio: AudioClip,
    pub entries: Vec<TimelineEntry>,
}

impl AssembledTrack {
    pub fn duration_ms(&self) -> u64 {
        self.audio.duration_ms()
    }
}

/// Stitches per-unit audio into one track
#[derive(Debug, Clone, Default)]
pub struct TimelineAssembler {
    settings: TimelineSettings,
}

impl TimelineAssembler {
    pub fn new(settings: TimelineSettings) -> Self {
        Self { settings }
    }

    /// Assemble results aligned 1:1 with `units`
    pub fn assemble(&self, units: &[TextUnit], results: Vec<SynthesisResult>) -> Result<AssembledTrack, JobError> {
        if units.len() != results.len() {
            return Err(JobError::Internal(format!(
                "{} units but {} synthesis results",
                units.len(),
                results.len()
            )));
        }

        let mut track = TrackBuilder::new(self.settings.sample_rate);
        let mut entries = Vec::with_capacity(units.len());

        // every start and end is read off the track itself
        for (unit, result) in units.iter().zip(results) {
            let start_ms = track.position_ms();
            match &unit.kind {
                UnitKind::PageTrigger(page) => {
                    entries.push(TimelineEntry {
                        index: unit.index,
                        text: String::new(),
                        start_ms,
                        end_ms: start_ms,
                        is_image: false,
                        page_trigger: Some(*page),
                    });
                }
                UnitKind::ImageMarker(_) => {
                    track.append_silence(self.settings.image_dwell_ms);
                    entries.push(TimelineEntry {
                        index: unit.index,
                        text: unit.raw_text.clone(),
                        start_ms,
                        end_ms: track.position_ms(),
                        is_image: true,
                        page_trigger: None,
                    });
                }
                UnitKind::Speakable => {
                    let clip = result
                        .audio
                        .unwrap_or_else(|| AudioClip::empty(self.settings.sample_rate));
                    self.append_clip(&mut track, unit.index, clip);

                    entries.push(TimelineEntry {
                        index: unit.index,
                        text: unit.raw_text.clone(),
                        start_ms,
                        end_ms: track.position_ms(),
                        is_image: false,
                        page_trigger: None,
                    });

                    track.append_silence(self.settings.pause_sentence_ms);
                }
            }
        }

        Ok(AssembledTrack {
            audio: track.finish(),
            entries,
        })
    }

    /// Append a clip. A clip that cannot be resampled is replaced by silence
    /// of the same length.
    fn append_clip(&self, track: &mut TrackBuilder, index: usize, clip: AudioClip) {
        let duration = clip.duration_ms();
        if let Err(e) = track.append(clip) {
            warn!("Unit {} could not be resampled, using silence: {}", index, e);
            track.append_silence(duration);
        }
    }
}

/// The timeline path that belongs to an audio path
pub fn timeline_path_for(audio_path: &Path) -> PathBuf {
    audio_path.with_extension("json")
}

/// Write the track and its timeline next to each other.
///
/// Both files are written to temporary files first. If either cannot be put
/// in place, or `cancel` fires before they are, the outputs are left as they
/// were before the call: a new audio file is removed again and an older one
/// is restored. Returns the timeline path.
pub fn persist(track: &AssembledTrack, audio_path: &Path, cancel: &CancellationToken) -> Result<PathBuf, JobError> {
    let timeline_path = timeline_path_for(audio_path);
    let dir = audio_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let persist_error = |e: std::io::Error| JobError::Persist(e.to_string());

    let mut audio_tmp = NamedTempFile::new_in(dir).map_err(persist_error)?;
    track
        .audio
        .write_wav(BufWriter::new(audio_tmp.as_file_mut()))?;

    let mut json_tmp = NamedTempFile::new_in(dir).map_err(persist_error)?;
    {
        let mut writer = BufWriter::new(json_tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, &track.entries)
            .map_err(|e| JobError::Persist(e.to_string()))?;
        writer.flush().map_err(persist_error)?;
    }

    if cancel.is_cancelled() {
        return Err(JobError::Cancelled);
    }

    let previous = set_aside(audio_path, dir)?;
    if let Err(e) = audio_tmp.persist(audio_path) {
        restore(previous, audio_path);
        return Err(JobError::Persist(e.error.to_string()));
    }

    if cancel.is_cancelled() {
        restore(previous, audio_path);
        return Err(JobError::Cancelled);
    }
    if let Err(e) = json_tmp.persist(&timeline_path) {
        restore(previous, audio_path);
        return Err(JobError::Persist(e.error.to_string()));
    }

    info!(
        "Wrote {} ({} ms) and {} ({} entries)",
        audio_path.display(),
        track.duration_ms(),
        timeline_path.display(),
        track.entries.len()
    );
    Ok(timeline_path)
}

/// Move an existing file to a temporary path in `dir`. The returned path
/// deletes the old file when dropped.
fn set_aside(path: &Path, dir: &Path) -> Result<Option<TempPath>, JobError> {
    if !path.exists() {
        return Ok(None);
    }
    let backup = tempfile::Builder::new()
        .prefix(".previous")
        .tempfile_in(dir)
        .map_err(|e| JobError::Persist(e.to_string()))?
        .into_temp_path();
    std::fs::rename(path, &backup).map_err(|e| JobError::Persist(e.to_string()))?;
    Ok(Some(backup))
}

/// Put back what `set_aside` moved, or remove a file that did not exist before
fn restore(previous: Option<TempPath>, path: &Path) {
    let restored = match previous {
        Some(backup) => backup.persist(path).map_err(|e| e.error),
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        },
    };
    if let Err(e) = restored {
        warn!("Could not restore {}: {}", path.display(), e);
    }
}

/// Persist on the blocking pool so the scheduler threads stay free.
/// The blocking write cannot be aborted, so it checks `cancel` itself.
pub async fn persist_in_background(
    track: AssembledTrack,
    audio_path: PathBuf,
    cancel: CancellationToken,
) -> Result<PathBuf, JobError> {
    tokio::task::spawn_blocking(move || persist(&track, &audio_path, &cancel))
        .await
        .map_err(|e| JobError::Internal(format!("persist task failed: {}", e)))?
}

/// Read a timeline file back
pub fn load_timeline(path: &Path) -> Result<Vec<TimelineEntry>, JobError> {
    let file = File::open(path).map_err(|e| JobError::Persist(e.to_string()))?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|e| JobError::Persist(e.to_string()))
}
