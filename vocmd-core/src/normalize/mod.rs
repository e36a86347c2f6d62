//! Peak normalization and 16-bit quantization.
//!
//! The loudest sample is scaled to `peak_target` (0.99) of full scale and
//! every sample is then multiplied by `i16::MAX` and rounded. A segment whose
//! peak is exactly zero skips scaling and quantizes to all zeros.

use crate::segment::Segment;

/// Default peak level as a fraction of full scale.
pub const DEFAULT_PEAK_TARGET: f32 = 0.99;

/// A quantized segment, ready for feature extraction or WAV export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcm16Segment {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Pcm16Segment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> u16 {
        self.samples
            .iter()
            .map(|s| s.unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    /// Back to floats on the quantizer's scale (`sample / i16::MAX`).
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect()
    }
}

/// Scale `samples` so the peak hits `peak_target`, then quantize to i16.
pub fn peak_normalize(samples: &[f32], peak_target: f32) -> Vec<i16> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    let full_scale = i16::MAX as f32;

    if peak > 0.0 {
        let gain = peak_target / peak;
        samples
            .iter()
            .map(|&s| (s * gain * full_scale).round().clamp(-full_scale, full_scale) as i16)
            .collect()
    } else {
        vec![0; samples.len()]
    }
}

/// Normalize a selected segment.
pub fn normalize_segment(segment: &Segment, peak_target: f32) -> Pcm16Segment {
    Pcm16Segment {
        samples: peak_normalize(&segment.samples, peak_target),
        sample_rate: segment.sample_rate,
    }
}
