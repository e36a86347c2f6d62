//! Voice Activity Detection (VAD) and the speech gate.
//!
//! The `VoiceActivityDetector` trait is the extensibility point: swap in
//! `EnergyVad` (default) or any scripted/neural detector without touching
//! the gate.
//!
//! The gate splits the buffer into fixed 30 ms frames, converts each to
//! 16-bit PCM, asks the detector for a decision and zeroes every sample of
//! the frames judged non-speech. A trailing partial frame is never shown to
//! the detector and is always treated as non-speech. Samples are multiplied
//! by the mask, never removed, so timing stays aligned with the source.

pub mod energy;

pub use energy::{Aggressiveness, EnergyVad};

use tracing::{debug, warn};

use crate::audio::AudioBuffer;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Trait for all VAD implementations.
///
/// Implementors may be stateful (hangover counters, etc.); the gate calls
/// [`reset`](Self::reset) before each recording.
pub trait VoiceActivityDetector: Send + 'static {
    /// Classify one frame of 16-bit PCM captured at `sample_rate`.
    fn classify(&mut self, frame: &[i16], sample_rate: u32) -> VadDecision;

    /// Reset any internal state (e.g. hangover counters).
    fn reset(&mut self);
}

/// Per-sample speech flags aligned with an [`AudioBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechMask(Vec<bool>);

impl SpeechMask {
    /// Expand per-frame decisions to per-sample flags and fit to `len`.
    ///
    /// Missing tail samples are padded with `false`; surplus flags are cut.
    pub fn from_frames(decisions: &[VadDecision], frame_len: usize, len: usize) -> Self {
        let mut flags: Vec<bool> = decisions
            .iter()
            .flat_map(|d| std::iter::repeat(d.is_speech()).take(frame_len))
            .collect();
        flags.resize(len, false);
        Self(flags)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn speech_samples(&self) -> usize {
        self.0.iter().filter(|&&f| f).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// Multiply `samples` by the mask in place.
    pub fn apply(&self, samples: &mut [f32]) {
        for (s, &keep) in samples.iter_mut().zip(&self.0) {
            if !keep {
                *s = 0.0;
            }
        }
    }
}

/// Convert a float frame to 16-bit PCM, saturating at full scale.
pub fn to_pcm16(frame: &[f32]) -> Vec<i16> {
    frame
        .iter()
        .map(|&s| (s * 32_768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Frames the buffer and gates out non-speech.
pub struct SpeechGate {
    vad: Box<dyn VoiceActivityDetector>,
    frame_ms: u32,
}

impl SpeechGate {
    pub fn new(vad: Box<dyn VoiceActivityDetector>, frame_ms: u32) -> Self {
        Self {
            vad,
            frame_ms: frame_ms.max(1),
        }
    }

    /// Samples per frame at `sample_rate`.
    pub fn frame_len(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.frame_ms as u64 / 1_000) as usize).max(1)
    }

    /// Classify every full frame of `buffer` and build the per-sample mask.
    pub fn speech_mask(&mut self, buffer: &AudioBuffer) -> SpeechMask {
        let frame_len = self.frame_len(buffer.sample_rate);
        self.vad.reset();

        let decisions: Vec<VadDecision> = buffer
            .samples
            .chunks_exact(frame_len)
            .map(|frame| self.vad.classify(&to_pcm16(frame), buffer.sample_rate))
            .collect();

        let speech_frames = decisions.iter().filter(|d| d.is_speech()).count();
        debug!(
            frames = decisions.len(),
            speech_frames,
            frame_len,
            "voice activity classified"
        );

        SpeechMask::from_frames(&decisions, frame_len, buffer.len())
    }

    /// Zero out non-speech regions. The buffer keeps its length.
    pub fn apply(&mut self, mut buffer: AudioBuffer) -> AudioBuffer {
        let mask = self.speech_mask(&buffer);
        if mask.speech_samples() == 0 && !buffer.is_empty() {
            warn!("no speech detected; gated buffer is silent");
        }
        mask.apply(&mut buffer.samples);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed decision script, then reports silence.
    struct ScriptedVad {
        script: Vec<VadDecision>,
        pos: usize,
    }

    impl VoiceActivityDetector for ScriptedVad {
        fn classify(&mut self, _frame: &[i16], _sample_rate: u32) -> VadDecision {
            let d = self
                .script
                .get(self.pos)
                .copied()
                .unwrap_or(VadDecision::Silence);
            self.pos += 1;
            d
        }

        fn reset(&mut self) {
            self.pos = 0;
        }
    }

    struct AlwaysSpeech;

    impl VoiceActivityDetector for AlwaysSpeech {
        fn classify(&mut self, _frame: &[i16], _sample_rate: u32) -> VadDecision {
            VadDecision::Speech
        }

        fn reset(&mut self) {}
    }

    use super::VadDecision::{Silence, Speech};

    #[test]
    fn mask_pads_partial_frame_with_false() {
        let mask = SpeechMask::from_frames(&[Speech, Speech], 3, 8);
        assert_eq!(
            mask.as_slice(),
            &[true, true, true, true, true, true, false, false]
        );
    }

    #[test]
    fn mask_truncates_to_length() {
        let mask = SpeechMask::from_frames(&[Speech, Silence], 4, 6);
        assert_eq!(mask.as_slice(), &[true, true, true, true, false, false]);
    }

    #[test]
    fn gate_zeroes_silence_frames_and_keeps_length() {
        let vad = ScriptedVad {
            script: vec![Silence, Speech, Silence],
            pos: 0,
        };
        let mut gate = SpeechGate::new(Box::new(vad), 30);
        let frame = gate.frame_len(16_000);
        assert_eq!(frame, 480);

        let buffer = AudioBuffer::new(vec![0.5; frame * 3 + 100], 16_000);
        let out = gate.apply(buffer);

        assert_eq!(out.len(), frame * 3 + 100);
        assert!(out.samples[..frame].iter().all(|&s| s == 0.0));
        assert!(out.samples[frame..2 * frame].iter().all(|&s| s == 0.5));
        assert!(out.samples[2 * frame..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn trailing_partial_frame_is_never_speech() {
        let mut gate = SpeechGate::new(Box::new(AlwaysSpeech), 30);
        let out = gate.apply(AudioBuffer::new(vec![0.5; 1_000], 16_000));
        assert!(out.samples[..960].iter().all(|&s| s == 0.5));
        assert!(out.samples[960..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn gate_resets_detector_between_recordings() {
        let vad = ScriptedVad {
            script: vec![Speech],
            pos: 0,
        };
        let mut gate = SpeechGate::new(Box::new(vad), 30);
        let first = gate.apply(AudioBuffer::new(vec![0.5; 480], 16_000));
        let second = gate.apply(AudioBuffer::new(vec![0.5; 480], 16_000));
        assert_eq!(first, second);
    }

    #[test]
    fn pcm16_conversion_saturates() {
        assert_eq!(
            to_pcm16(&[0.0, 0.5, -1.0, 1.0, 2.0]),
            vec![0, 16_384, -32_768, 32_767, 32_767]
        );
    }
}
