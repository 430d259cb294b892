/*!
 * Audio buffers for the narration track.
 *
 * Everything is handled as mono f32 PCM. Provider audio arrives as WAV bytes,
 * is decoded with `hound`, mixed down, brought to the canonical frame rate
 * with `rubato`, and the final track is written back out as 16-bit WAV.
 */

use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::{Cursor, Seek, Write};

use crate::errors::AudioError;

/// Input frames per resampler call
const RESAMPLE_CHUNK: usize = 1024;

/// A mono PCM clip
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// A clip with no samples
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    /// Silence of the given length
    pub fn silence(duration_ms: u64, sample_rate: u32) -> Self {
        let count = (duration_ms * sample_rate as u64 / 1000) as usize;
        Self::new(vec![0.0; count], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in whole milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    /// Decode a WAV byte stream of any bit depth and channel count
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, AudioError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };

        Ok(Self::new(samples, spec.sample_rate))
    }

    /// Encode as 16-bit mono WAV into any seekable writer
    pub fn write_wav<W: Write + Seek>(&self, writer: W) -> Result<(), AudioError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut wav = hound::WavWriter::new(writer, spec)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        for sample in &self.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            wav.write_sample(value)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }
        wav.finalize().map_err(|e| AudioError::Encode(e.to_string()))
    }

    /// Encode as 16-bit mono WAV bytes
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, AudioError> {
        let mut buffer = Vec::new();
        self.write_wav(Cursor::new(&mut buffer))?;
        Ok(buffer)
    }

    /// Scale every sample, clipping to the valid range
    pub fn apply_gain(&mut self, gain: f32) {
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for sample in &mut self.samples {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }

    /// Convert to another frame rate
    pub fn resampled(self, target_rate: u32) -> Result<Self, AudioError> {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Ok(Self::new(self.samples, target_rate));
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let interpolation = if ratio > 1.0 {
            SincInterpolationType::Cubic
        } else {
            SincInterpolationType::Linear
        };
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        let expected = (self.samples.len() as f64 * ratio).round() as usize;
        let delay = resampler.output_delay();

        let mut output: Vec<f32> = Vec::with_capacity(expected + delay);
        let mut chunks = self.samples.chunks_exact(RESAMPLE_CHUNK);
        for chunk in &mut chunks {
            let wave_in: [&[f32]; 1] = [chunk];
            let waves_out = resampler
                .process(&wave_in[..], None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            output.extend_from_slice(&waves_out[0]);
        }

        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let wave_in: [&[f32]; 1] = [remainder];
            let waves_out = resampler
                .process_partial(Some(&wave_in[..]), None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            output.extend_from_slice(&waves_out[0]);
        }

        // flush the filter until the delayed tail is out
        while output.len() < expected + delay {
            let waves_out = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            if waves_out[0].is_empty() {
                break;
            }
            output.extend_from_slice(&waves_out[0]);
        }

        let mut samples: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
        samples.resize(expected, 0.0);
        debug!(
            "Resampled {}Hz -> {}Hz ({} samples)",
            self.sample_rate,
            target_rate,
            samples.len()
        );
        Ok(Self::new(samples, target_rate))
    }
}

/// Accumulates clips into one track at a fixed frame rate
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl TrackBuilder {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Append a clip, resampling it first when needed
    pub fn append(&mut self, clip: AudioClip) -> Result<(), AudioError> {
        let clip = clip.resampled(self.sample_rate)?;
        self.samples.extend_from_slice(clip.samples());
        Ok(())
    }

    /// Current end of the track, rounded to the nearest millisecond.
    /// Derived from the sample count so timings never drift from the audio.
    pub fn position_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let rate = self.sample_rate as u64;
        (self.samples.len() as u64 * 1000 + rate / 2) / rate
    }

    /// Append silence of the given length
    pub fn append_silence(&mut self, duration_ms: u64) {
        let count = (duration_ms * self.sample_rate as u64 / 1000) as usize;
        self.samples.resize(self.samples.len() + count, 0.0);
    }

    pub fn finish(self) -> AudioClip {
        AudioClip::new(self.samples, self.sample_rate)
    }
}
