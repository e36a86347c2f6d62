//! Mono audio buffers, WAV decoding and sample-rate conversion.
//!
//! Every stage after the loader works on an [`AudioBuffer`]: one channel of
//! f32 samples in roughly [-1.0, 1.0] plus the rate they were captured at.
//!
//! # Down-mix rule
//!
//! Multi-channel recordings collapse to mono by **averaging** all channels of
//! each frame with equal weight. A stereo file with identical channels
//! therefore decodes to exactly the single-channel signal, and a file with one
//! silent channel decodes at half amplitude. This rule is fixed; downstream
//! energy thresholds are tuned against it.

pub mod loader;
pub mod resample;
pub mod wav;

pub use loader::{load_bytes, load_path, load_reader};
pub use resample::{resample, RateConverter};
pub use wav::write_pcm16_wav;

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Each pipeline stage takes the buffer by value or by `&mut` and hands a new
/// one on; no stage keeps a reference to a previous stage's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A buffer of `len` zero samples.
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    /// Returns the duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute sample value (0.0 for an empty buffer).
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Root-mean-square level of the whole buffer.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    /// Zero-pad the tail so the buffer holds at least `min_len` samples.
    pub fn pad_to(&mut self, min_len: usize) {
        if self.samples.len() < min_len {
            self.samples.resize(min_len, 0.0);
        }
    }
}

/// Compute the root-mean-square of a sample slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Average interleaved frames down to a single channel.
pub fn downmix_interleaved(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let stereo = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(downmix_interleaved(&stereo, 2), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn downmix_identical_channels_is_lossless() {
        let mono: Vec<f32> = (0..64).map(|i| (i as f32 * 0.1).sin()).collect();
        let stereo: Vec<f32> = mono.iter().flat_map(|&s| [s, s]).collect();
        assert_eq!(downmix_interleaved(&stereo, 2), mono);
    }

    #[test]
    fn downmix_drops_incomplete_trailing_frame() {
        let data = [0.2, 0.4, 0.6];
        assert_eq!(downmix_interleaved(&data, 2).len(), 1);
    }

    #[test]
    fn pad_to_only_grows() {
        let mut buf = AudioBuffer::new(vec![1.0; 10], 16_000);
        buf.pad_to(4);
        assert_eq!(buf.len(), 10);
        buf.pad_to(16);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf.samples[10..], &[0.0; 6]);
    }

    #[test]
    fn rms_of_square_wave() {
        let samples: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        assert!((rms(&samples) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn duration_and_peak() {
        let buf = AudioBuffer::new(vec![0.0, -0.75, 0.25, 0.0], 4);
        assert!((buf.duration_secs() - 1.0).abs() < 1e-12);
        assert_eq!(buf.peak(), 0.75);
    }
}
