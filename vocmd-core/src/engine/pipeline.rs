//! Stage-by-stage driver and lock-free run counters.
//!
//! ```text
//! AudioBuffer (any rate)
//!   └─► resample to target ─► [pad] ─► NoiseReducer ─► SpeechGate
//!         └─► SegmentSelector ─► peak_normalize ─► MelExtractor ─► ProcessedAudio
//! ```
//!
//! Each stage takes the previous stage's output by value, so no buffer is
//! aliased across stages. Errors from any stage abort the run and are
//! returned unchanged.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::audio::{resample, AudioBuffer};
use crate::denoise::NoiseReducer;
use crate::error::{Result, VocmdError};
use crate::features::{MelExtractor, MelSpectrogram};
use crate::normalize::{normalize_segment, Pcm16Segment};
use crate::segment::SegmentSelector;
use crate::vad::SpeechGate;

#[derive(Debug)]
pub struct PipelineDiagnostics {
    pub runs: AtomicUsize,
    pub decode_failures: AtomicUsize,
    pub insufficient_audio: AtomicUsize,
    pub feature_failures: AtomicUsize,
    pub padded_inputs: AtomicUsize,
    pub silent_segments: AtomicUsize,
    pub classifier_calls: AtomicUsize,
    pub classifier_errors: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            runs: AtomicUsize::new(0),
            decode_failures: AtomicUsize::new(0),
            insufficient_audio: AtomicUsize::new(0),
            feature_failures: AtomicUsize::new(0),
            padded_inputs: AtomicUsize::new(0),
            silent_segments: AtomicUsize::new(0),
            classifier_calls: AtomicUsize::new(0),
            classifier_errors: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.runs.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
        self.insufficient_audio.store(0, Ordering::Relaxed);
        self.feature_failures.store(0, Ordering::Relaxed);
        self.padded_inputs.store(0, Ordering::Relaxed);
        self.silent_segments.store(0, Ordering::Relaxed);
        self.classifier_calls.store(0, Ordering::Relaxed);
        self.classifier_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            insufficient_audio: self.insufficient_audio.load(Ordering::Relaxed),
            feature_failures: self.feature_failures.load(Ordering::Relaxed),
            padded_inputs: self.padded_inputs.load(Ordering::Relaxed),
            silent_segments: self.silent_segments.load(Ordering::Relaxed),
            classifier_calls: self.classifier_calls.load(Ordering::Relaxed),
            classifier_errors: self.classifier_errors.load(Ordering::Relaxed),
        }
    }

    /// Count a failed run under the matching counter.
    pub(crate) fn record_error(&self, err: &VocmdError) {
        let counter = match err {
            VocmdError::Decode(_) => &self.decode_failures,
            VocmdError::InsufficientAudio { .. } => &self.insufficient_audio,
            VocmdError::FeatureExtraction(_) => &self.feature_failures,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub runs: usize,
    pub decode_failures: usize,
    pub insufficient_audio: usize,
    pub feature_failures: usize,
    pub padded_inputs: usize,
    pub silent_segments: usize,
    pub classifier_calls: usize,
    pub classifier_errors: usize,
}

/// Everything one run produces before classification.
#[derive(Debug, Clone)]
pub struct ProcessedAudio {
    /// The normalized 1 s segment.
    pub waveform: Pcm16Segment,
    /// Offset of the segment in the gated recording, in samples.
    pub segment_start: usize,
    /// Sum of squares of the selected window before normalization.
    pub segment_energy: f64,
    /// Samples the VAD kept.
    pub speech_samples: usize,
    pub mel: MelSpectrogram,
}

/// Borrowed view of the stage objects owned by `CommandPipeline`.
pub(crate) struct Stages<'a> {
    pub target_sample_rate: u32,
    pub pad_short_input: bool,
    pub peak_target: f32,
    pub reducer: &'a NoiseReducer,
    pub gate: &'a Mutex<SpeechGate>,
    pub selector: &'a SegmentSelector,
    pub mel: &'a MelExtractor,
    pub diagnostics: &'a PipelineDiagnostics,
}

impl Stages<'_> {
    pub fn run(&self, buffer: AudioBuffer) -> Result<ProcessedAudio> {
        let result = self.run_stages(buffer);
        if let Err(e) = &result {
            self.diagnostics.record_error(e);
            error!("pipeline failed: {e}");
        }
        result
    }

    fn run_stages(&self, buffer: AudioBuffer) -> Result<ProcessedAudio> {
        let target = self.target_sample_rate;

        let mut buffer = if buffer.sample_rate == target {
            buffer
        } else {
            let samples = resample(&buffer.samples, buffer.sample_rate, target)?;
            AudioBuffer::new(samples, target)
        };

        let required = self.selector.min_input_len(target);
        if self.pad_short_input && buffer.len() < required {
            debug!(samples = buffer.len(), required, "zero-padding short recording");
            buffer.pad_to(required);
            self.diagnostics
                .padded_inputs
                .fetch_add(1, Ordering::Relaxed);
        }

        let denoised = self.reducer.reduce(buffer, target)?;

        let mask = self.gate.lock().speech_mask(&denoised);
        let speech_samples = mask.speech_samples();
        if speech_samples == 0 {
            warn!("no speech detected; gated buffer is silent");
        }
        let mut gated = denoised;
        mask.apply(&mut gated.samples);

        let segment = self.selector.select(&gated)?;
        if segment.is_silent() {
            warn!("selected segment is silent; features will be flat");
            self.diagnostics
                .silent_segments
                .fetch_add(1, Ordering::Relaxed);
        }

        let waveform = normalize_segment(&segment, self.peak_target);
        debug!(
            start = segment.start,
            peak = waveform.peak(),
            "segment normalized"
        );

        let mel = self.mel.extract_pcm16(&waveform)?;

        Ok(ProcessedAudio {
            waveform,
            segment_start: segment.start,
            segment_energy: segment.energy,
            speech_samples,
            mel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_routes_to_counters() {
        let diag = PipelineDiagnostics::default();
        diag.record_error(&VocmdError::Decode("bad header".into()));
        diag.record_error(&VocmdError::InsufficientAudio {
            samples: 1,
            required: 2,
        });
        diag.record_error(&VocmdError::InsufficientAudio {
            samples: 1,
            required: 2,
        });
        diag.record_error(&VocmdError::Inference("ignored".into()));

        let snap = diag.snapshot();
        assert_eq!(snap.decode_failures, 1);
        assert_eq!(snap.insufficient_audio, 2);
        assert_eq!(snap.feature_failures, 0);

        diag.reset();
        assert_eq!(diag.snapshot(), PipelineDiagnostics::default().snapshot());
    }
}
