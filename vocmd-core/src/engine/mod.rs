//! `CommandPipeline`: top-level entry point.
//!
//! ## Lifecycle
//!
//! ```text
//! CommandPipeline::new(config)
//!     └─► process_path() / process_bytes() / process_buffer()  → ProcessedAudio
//!         └─► classify(&processed, &ClassifierHandle)            → CommandReport
//! ```
//!
//! `recognize_path()` chains both steps. The pipeline holds only immutable
//! DSP state plus the VAD behind a `parking_lot::Mutex`, so one instance can
//! be shared as `Arc<CommandPipeline>` across worker threads.

pub mod pipeline;

pub use pipeline::{DiagnosticsSnapshot, PipelineDiagnostics, ProcessedAudio};

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span};

use crate::audio::{load_bytes, load_path, AudioBuffer};
use crate::denoise::{DenoiseConfig, NoiseReducer};
use crate::error::Result;
use crate::features::{MelConfig, MelExtractor};
use crate::inference::ClassifierHandle;
use crate::normalize::DEFAULT_PEAK_TARGET;
use crate::report::CommandReport;
use crate::segment::{SearchStrategy, SegmentSelector, SelectorConfig};
use crate::vad::{Aggressiveness, EnergyVad, SpeechGate, VoiceActivityDetector};

/// Configuration for `CommandPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rate every stage after the loader runs at (Hz). Default: 16000.
    pub target_sample_rate: u32,
    /// VAD frame length. Default: 30 ms.
    pub vad_frame_ms: u32,
    /// VAD strictness, 0 (permissive) to 3 (strict). Default: 2.
    pub vad_aggressiveness: u8,
    /// Frames kept as speech after the last voiced frame. Default: 3.
    pub vad_hangover_frames: u32,
    /// Default: 1.5 s.
    pub coarse_window_secs: f32,
    /// Coarse stride as a fraction of the sample rate. Default: 0.2.
    pub coarse_stride_ratio: f32,
    /// Length of the output segment. Default: 1.0 s.
    pub fine_window_secs: f32,
    /// Fine stride as a fraction of the sample rate. Default: 0.02.
    pub fine_stride_ratio: f32,
    pub search: SearchStrategy,
    /// Peak level after normalization, as a fraction of full scale.
    pub peak_target: f32,
    /// Zero-pad recordings shorter than the coarse window instead of failing.
    pub pad_short_input: bool,
    pub denoise: DenoiseConfig,
    pub mel: MelConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let selector = SelectorConfig::default();
        Self {
            target_sample_rate: 16_000,
            vad_frame_ms: 30,
            vad_aggressiveness: 2,
            vad_hangover_frames: 3,
            coarse_window_secs: selector.coarse_window_secs,
            coarse_stride_ratio: selector.coarse_stride_ratio,
            fine_window_secs: selector.fine_window_secs,
            fine_stride_ratio: selector.fine_stride_ratio,
            search: selector.strategy,
            peak_target: DEFAULT_PEAK_TARGET,
            pad_short_input: false,
            denoise: DenoiseConfig::default(),
            mel: MelConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            coarse_window_secs: self.coarse_window_secs,
            coarse_stride_ratio: self.coarse_stride_ratio,
            fine_window_secs: self.fine_window_secs,
            fine_stride_ratio: self.fine_stride_ratio,
            strategy: self.search,
        }
    }

    /// The stock detector for this configuration.
    pub fn default_vad(&self) -> EnergyVad {
        EnergyVad::new(
            Aggressiveness::from_mode(self.vad_aggressiveness),
            self.vad_hangover_frames,
        )
    }
}

/// The preprocessing pipeline plus its diagnostics.
///
/// `CommandPipeline` is `Send + Sync`; wrap it in `Arc` to share it.
pub struct CommandPipeline {
    config: PipelineConfig,
    reducer: NoiseReducer,
    gate: Mutex<SpeechGate>,
    selector: SegmentSelector,
    mel: MelExtractor,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl CommandPipeline {
    /// Build a pipeline with the stock energy VAD.
    ///
    /// # Errors
    /// `VocmdError::FeatureExtraction` if the mel parameters are invalid for
    /// the target rate.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let vad = config.default_vad();
        Self::with_vad(config, Box::new(vad))
    }

    /// Build a pipeline around a caller-supplied detector.
    pub fn with_vad(config: PipelineConfig, vad: Box<dyn VoiceActivityDetector>) -> Result<Self> {
        let mel = MelExtractor::new(config.mel.clone(), config.target_sample_rate)?;
        Ok(Self {
            reducer: NoiseReducer::new(config.denoise.clone()),
            gate: Mutex::new(SpeechGate::new(vad, config.vad_frame_ms)),
            selector: SegmentSelector::new(config.selector_config()),
            mel,
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> Arc<PipelineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    /// Decode a WAV file and run every stage.
    pub fn process_path(&self, path: impl AsRef<Path>) -> Result<ProcessedAudio> {
        let path = path.as_ref();
        let span = info_span!("pipeline", source = %path.display());
        let _enter = span.enter();

        let buffer = self.load(|| load_path(path, self.config.target_sample_rate))?;
        self.run(buffer)
    }

    /// Decode an in-memory WAV and run every stage.
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<ProcessedAudio> {
        let span = info_span!("pipeline", source = "bytes", len = bytes.len());
        let _enter = span.enter();

        let buffer = self.load(|| load_bytes(bytes, self.config.target_sample_rate))?;
        self.run(buffer)
    }

    /// Run every stage on an already decoded mono buffer at any rate.
    pub fn process_buffer(&self, buffer: AudioBuffer) -> Result<ProcessedAudio> {
        let span = info_span!(
            "pipeline",
            source = "buffer",
            samples = buffer.len(),
            sample_rate = buffer.sample_rate
        );
        let _enter = span.enter();
        self.run(buffer)
    }

    /// Score a processed recording and build its report.
    pub fn classify(
        &self,
        processed: &ProcessedAudio,
        classifier: &ClassifierHandle,
    ) -> Result<CommandReport> {
        self.diagnostics
            .classifier_calls
            .fetch_add(1, Ordering::Relaxed);
        let prediction = classifier.classify(&processed.mel).inspect_err(|e| {
            self.diagnostics
                .classifier_errors
                .fetch_add(1, Ordering::Relaxed);
            error!("classifier failed: {e}");
        })?;

        info!(
            predicted_class = %prediction.label,
            confidence = prediction.confidence,
            segment_start = processed.segment_start,
            "command classified"
        );
        Ok(CommandReport::success(
            prediction,
            &processed.waveform,
            processed.segment_start,
        ))
    }

    /// `process_path` followed by `classify`.
    pub fn recognize_path(
        &self,
        path: impl AsRef<Path>,
        classifier: &ClassifierHandle,
    ) -> Result<CommandReport> {
        let processed = self.process_path(path)?;
        self.classify(&processed, classifier)
    }

    fn load(&self, decode: impl FnOnce() -> Result<AudioBuffer>) -> Result<AudioBuffer> {
        decode().inspect_err(|e| {
            self.diagnostics.runs.fetch_add(1, Ordering::Relaxed);
            self.diagnostics.record_error(e);
            error!("failed to load audio: {e}");
        })
    }

    fn run(&self, buffer: AudioBuffer) -> Result<ProcessedAudio> {
        self.diagnostics.runs.fetch_add(1, Ordering::Relaxed);
        pipeline::Stages {
            target_sample_rate: self.config.target_sample_rate,
            pad_short_input: self.config.pad_short_input,
            peak_target: self.config.peak_target,
            reducer: &self.reducer,
            gate: &self.gate,
            selector: &self.selector,
            mel: &self.mel,
            diagnostics: &self.diagnostics,
        }
        .run(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_json_with_defaults() {
        let json = r#"{ "pad_short_input": true, "search": "single_pass", "mel": { "frames": 48 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).expect("parse config");
        assert!(config.pad_short_input);
        assert_eq!(config.search, SearchStrategy::SinglePass);
        assert_eq!(config.mel.frames, 48);
        assert_eq!(config.mel.n_mels, 128);
        assert_eq!(config.target_sample_rate, 16_000);
        assert_eq!(config.selector_config().strategy, SearchStrategy::SinglePass);
    }

    #[test]
    fn invalid_mel_config_fails_construction() {
        let config = PipelineConfig {
            mel: MelConfig {
                n_mels: 0,
                ..MelConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert!(CommandPipeline::new(config).is_err());
    }

    #[test]
    fn pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandPipeline>();
    }
}
