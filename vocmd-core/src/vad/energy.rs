//! Energy + spectral-shape VAD operating on 16-bit PCM frames.
//!
//! ## Algorithm
//!
//! 1. Frame level in dB: `10·log10(mean(x²) + 1)` on the raw i16 scale
//!    (a full-scale sine sits near 87 dB, digital silence at 0 dB).
//! 2. Speech-band ratio: share of the frame's spectral power (DC excluded)
//!    that falls between 200 Hz and 4 kHz.
//! 3. A frame is speech when the level reaches the mode's floor **and** the
//!    band ratio reaches the mode's minimum.
//! 4. After real speech, up to `hangover_frames` following frames are still
//!    reported as speech (prevents clipping syllable endings).
//!
//! Higher aggressiveness modes raise both floors, rejecting more
//! borderline frames.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::{VadDecision, VoiceActivityDetector};

const SPEECH_BAND_LOW_HZ: f32 = 200.0;
const SPEECH_BAND_HIGH_HZ: f32 = 4_000.0;

/// How strictly frames must look like speech, from permissive to strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    Quality,
    LowBitrate,
    #[default]
    Aggressive,
    VeryAggressive,
}

impl Aggressiveness {
    /// Map a numeric mode (0–3) to a level; larger values saturate.
    pub fn from_mode(mode: u8) -> Self {
        match mode {
            0 => Self::Quality,
            1 => Self::LowBitrate,
            2 => Self::Aggressive,
            _ => Self::VeryAggressive,
        }
    }

    /// Minimum frame level in dB (i16 scale).
    fn level_floor_db(self) -> f32 {
        match self {
            Self::Quality => 35.0,
            Self::LowBitrate => 40.0,
            Self::Aggressive => 45.0,
            Self::VeryAggressive => 50.0,
        }
    }

    /// Minimum share of power in the speech band.
    fn min_band_ratio(self) -> f32 {
        match self {
            Self::Quality => 0.3,
            Self::LowBitrate => 0.4,
            Self::Aggressive => 0.5,
            Self::VeryAggressive => 0.6,
        }
    }
}

/// Level + speech-band voice activity detector.
pub struct EnergyVad {
    mode: Aggressiveness,
    hangover_frames: u32,
    hangover_counter: u32,
    /// FFT planned for the last frame length seen.
    fft: Option<(usize, Arc<dyn Fft<f32>>)>,
}

impl EnergyVad {
    /// Create a new `EnergyVad`.
    ///
    /// # Parameters
    /// - `mode`: Strictness of the level and band thresholds.
    /// - `hangover_frames`: Number of frames to extend detected speech.
    ///   Default: `3` (90 ms at a 30 ms frame).
    pub fn new(mode: Aggressiveness, hangover_frames: u32) -> Self {
        Self {
            mode,
            hangover_frames,
            hangover_counter: 0,
            fft: None,
        }
    }

    /// Frame level in dB on the i16 scale.
    fn level_db(frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (10.0 * (sum_sq / frame.len() as f64 + 1.0).log10()) as f32
    }

    /// Share of non-DC spectral power inside the speech band.
    fn band_ratio(&mut self, frame: &[i16], sample_rate: u32) -> f32 {
        let n = frame.len();
        if n < 2 || sample_rate == 0 {
            return 0.0;
        }

        let fft = match &self.fft {
            Some((len, fft)) if *len == n => Arc::clone(fft),
            _ => {
                let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
                self.fft = Some((n, Arc::clone(&fft)));
                fft
            }
        };

        let mean = frame.iter().map(|&s| s as f32).sum::<f32>() / n as f32;
        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .map(|&s| Complex::new(s as f32 - mean, 0.0))
            .collect();
        fft.process(&mut buf);

        let bin_hz = sample_rate as f32 / n as f32;
        let mut total = 0.0f64;
        let mut band = 0.0f64;
        for (k, c) in buf.iter().enumerate().take(n / 2 + 1).skip(1) {
            let p = c.norm_sqr() as f64;
            total += p;
            let hz = k as f32 * bin_hz;
            if (SPEECH_BAND_LOW_HZ..=SPEECH_BAND_HIGH_HZ).contains(&hz) {
                band += p;
            }
        }

        if total <= 0.0 {
            0.0
        } else {
            (band / total) as f32
        }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(Aggressiveness::default(), 3)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &[i16], sample_rate: u32) -> VadDecision {
        let voiced = Self::level_db(frame) >= self.mode.level_floor_db()
            && self.band_ratio(frame, sample_rate) >= self.mode.min_band_ratio();

        if voiced {
            self.hangover_counter = self.hangover_frames;
            VadDecision::Speech
        } else if self.hangover_counter > 0 {
            self.hangover_counter -= 1;
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.hangover_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;
    const FRAME: usize = 480;

    fn tone(freq: f32, amplitude: f32) -> Vec<i16> {
        (0..FRAME)
            .map(|i| {
                let t = i as f32 / SR as f32;
                ((2.0 * std::f32::consts::PI * freq * t).sin() * amplitude * 32_767.0) as i16
            })
            .collect()
    }

    fn silent() -> Vec<i16> {
        vec![0; FRAME]
    }

    #[test]
    fn silence_is_not_speech() {
        let mut vad = EnergyVad::new(Aggressiveness::Aggressive, 0);
        assert_eq!(vad.classify(&silent(), SR), VadDecision::Silence);
    }

    #[test]
    fn loud_voice_band_tone_is_speech() {
        let mut vad = EnergyVad::new(Aggressiveness::Aggressive, 0);
        assert_eq!(vad.classify(&tone(500.0, 0.3), SR), VadDecision::Speech);
    }

    #[test]
    fn quiet_tone_is_rejected() {
        let mut vad = EnergyVad::new(Aggressiveness::Aggressive, 0);
        // ~0.0003 of full scale ≈ 16 dB on the i16 scale.
        assert_eq!(vad.classify(&tone(500.0, 0.0003), SR), VadDecision::Silence);
    }

    #[test]
    fn dc_offset_is_not_speech() {
        let mut vad = EnergyVad::new(Aggressiveness::Quality, 0);
        assert_eq!(vad.classify(&vec![20_000; FRAME], SR), VadDecision::Silence);
    }

    #[test]
    fn out_of_band_rumble_is_not_speech() {
        let mut vad = EnergyVad::new(Aggressiveness::Aggressive, 0);
        assert_eq!(vad.classify(&tone(66.7, 0.5), SR), VadDecision::Silence);
    }

    #[test]
    fn hangover_extends_speech() {
        let mut vad = EnergyVad::new(Aggressiveness::Aggressive, 2);
        assert_eq!(vad.classify(&tone(500.0, 0.3), SR), VadDecision::Speech);
        assert_eq!(vad.classify(&silent(), SR), VadDecision::Speech);
        assert_eq!(vad.classify(&silent(), SR), VadDecision::Speech);
        assert_eq!(vad.classify(&silent(), SR), VadDecision::Silence);
    }

    #[test]
    fn reset_clears_hangover() {
        let mut vad = EnergyVad::new(Aggressiveness::Aggressive, 5);
        vad.classify(&tone(500.0, 0.3), SR);
        vad.reset();
        assert_eq!(vad.classify(&silent(), SR), VadDecision::Silence);
    }

    #[test]
    fn empty_frame_is_silence() {
        let mut vad = EnergyVad::default();
        assert_eq!(vad.classify(&[], SR), VadDecision::Silence);
    }

    #[test]
    fn modes_saturate() {
        assert_eq!(Aggressiveness::from_mode(2), Aggressiveness::Aggressive);
        assert_eq!(Aggressiveness::from_mode(9), Aggressiveness::VeryAggressive);
    }

    #[test]
    fn level_of_full_scale_square() {
        let frame: Vec<i16> = (0..FRAME)
            .map(|i| if i % 2 == 0 { 32_767 } else { -32_767 })
            .collect();
        let db = EnergyVad::level_db(&frame);
        assert!((db - 90.3).abs() < 0.1, "db={db}");
    }
}
