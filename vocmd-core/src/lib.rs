//! # vocmd-core
//!
//! Voice-command preprocessing and feature extraction SDK.
//!
//! ## Architecture
//!
//! ```text
//! WAV → Loader/Resampler → NoiseReducer → SpeechGate (VAD)
//!                                              │
//!                                     SegmentSelector (1.5 s → 1.0 s)
//!                                              │
//!                                     peak_normalize (PCM16)
//!                                              │
//!                                     MelExtractor [128 × 32]
//!                                              │
//!                                  CommandClassifier::classify → CommandReport
//! ```
//!
//! Data flows one way; no stage depends on classifier output.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod denoise;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod features;
pub mod inference;
pub mod normalize;
pub mod report;
pub mod segment;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::AudioBuffer;
pub use engine::{CommandPipeline, DiagnosticsSnapshot, PipelineConfig, ProcessedAudio};
pub use error::{Result, VocmdError};
pub use features::{MelConfig, MelSpectrogram};
pub use inference::{
    default_labels, ClassifierHandle, CommandClassifier, Prediction, StubClassifier,
};
pub use normalize::Pcm16Segment;
pub use report::{CommandReport, ReportStatus};
pub use segment::SearchStrategy;

#[cfg(feature = "onnx")]
pub use inference::{OnnxClassifier, OnnxClassifierConfig};
