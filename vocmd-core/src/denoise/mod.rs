//! Stationary spectral-gating noise reduction.
//!
//! ## Algorithm
//!
//! 1. Centred STFT of the whole recording (Hann, `n_fft` / `hop`).
//! 2. The quietest `noise_frame_fraction` of frames (by total power) form the
//!    noise profile. The recording is its own noise reference; no separate
//!    noise-only clip is needed.
//! 3. Per frequency bin, take mean and standard deviation of the profile's
//!    magnitude in dB. The noise threshold for the bin is
//!    `mean + n_std_thresh * std`.
//! 4. A time-frequency cell passes when its dB magnitude exceeds the bin
//!    threshold. The binary mask is box-smoothed over
//!    `freq_smooth_hz` × `time_smooth_ms` to avoid musical noise.
//! 5. `gain = 1 - prop_decrease * (1 - mask)` is applied and the signal is
//!    rebuilt by weighted overlap-add.
//!
//! The output always has the input's length. The whole computation is a pure
//! function of the samples, so identical input gives bit-identical output.

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{resample, rms, AudioBuffer};
use crate::dsp::Stft;
use crate::error::Result;

/// Below this RMS the recording is treated as digital silence and passed
/// through untouched.
const SILENCE_RMS: f32 = 1e-7;
/// Magnitude floor before taking dB.
const AMIN: f32 = 1e-10;

/// Tunables for [`NoiseReducer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Set to `false` to skip spectral gating (resampling still happens).
    pub enabled: bool,
    pub n_fft: usize,
    pub hop: usize,
    /// Share of frames (quietest first) used as the noise profile, in (0, 1].
    pub noise_frame_fraction: f32,
    /// Standard deviations above the per-bin mean a cell must reach to pass.
    pub n_std_thresh: f32,
    /// Fraction of the gated energy to remove, in [0, 1].
    pub prop_decrease: f32,
    pub freq_smooth_hz: f32,
    pub time_smooth_ms: f32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_fft: 1024,
            hop: 256,
            noise_frame_fraction: 0.2,
            n_std_thresh: 1.5,
            prop_decrease: 1.0,
            freq_smooth_hz: 500.0,
            time_smooth_ms: 50.0,
        }
    }
}

/// Spectral noise suppressor. Holds only the FFT plans; safe to reuse.
pub struct NoiseReducer {
    config: DenoiseConfig,
    stft: Stft,
}

impl NoiseReducer {
    pub fn new(config: DenoiseConfig) -> Self {
        let stft = Stft::new(config.n_fft.max(2), config.hop.max(1));
        Self { config, stft }
    }

    /// Denoise `buffer` and return it at `target_rate`.
    ///
    /// Gating runs at the buffer's own rate; the result is resampled only if
    /// that rate differs from `target_rate`.
    pub fn reduce(&self, buffer: AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        let AudioBuffer {
            samples,
            sample_rate,
        } = buffer;

        let denoised = if self.config.enabled {
            self.gate(&samples, sample_rate)
        } else {
            samples
        };

        if sample_rate == target_rate {
            return Ok(AudioBuffer::new(denoised, sample_rate));
        }
        let resampled = resample(&denoised, sample_rate, target_rate)?;
        Ok(AudioBuffer::new(resampled, target_rate))
    }

    /// Apply the spectral gate at `sample_rate`. Output length == input length.
    pub fn gate(&self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        if samples.len() < self.stft.n_fft() {
            debug!(
                samples = samples.len(),
                n_fft = self.stft.n_fft(),
                "recording shorter than one FFT window; skipping noise reduction"
            );
            return samples.to_vec();
        }
        if rms(samples) < SILENCE_RMS {
            debug!("near-silent recording; skipping noise reduction");
            return samples.to_vec();
        }

        let mut frames = self.stft.forward(samples);
        let n_frames = frames.len();
        let n_bins = self.stft.n_bins();

        let db: Vec<Vec<f32>> = frames
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .map(|c| 20.0 * c.norm().max(AMIN).log10())
                    .collect()
            })
            .collect();

        let profile = quietest_frames(&frames, self.config.noise_frame_fraction);
        let thresholds: Vec<f32> = (0..n_bins)
            .map(|k| {
                let n = profile.len() as f64;
                let mean = profile.iter().map(|&f| db[f][k] as f64).sum::<f64>() / n;
                let var = profile
                    .iter()
                    .map(|&f| {
                        let d = db[f][k] as f64 - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / n;
                (mean + self.config.n_std_thresh as f64 * var.sqrt()) as f32
            })
            .collect();

        let mask: Vec<Vec<f32>> = db
            .iter()
            .map(|frame| {
                frame
                    .iter()
                    .zip(&thresholds)
                    .map(|(&v, &t)| if v > t { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();

        let bin_hz = sample_rate as f32 / self.stft.n_fft() as f32;
        let frame_ms = self.stft.hop() as f32 * 1_000.0 / sample_rate as f32;
        let freq_radius = (self.config.freq_smooth_hz / bin_hz / 2.0).round() as usize;
        let time_radius = (self.config.time_smooth_ms / frame_ms / 2.0).round() as usize;
        let mask = smooth_mask(&mask, time_radius, freq_radius);

        let prop = self.config.prop_decrease.clamp(0.0, 1.0);
        let mut kept = 0.0f64;
        for (frame, gains) in frames.iter_mut().zip(&mask) {
            for (cell, &m) in frame.iter_mut().zip(gains) {
                let gain = 1.0 - prop * (1.0 - m);
                kept += gain as f64;
                *cell *= gain;
            }
        }

        debug!(
            frames = n_frames,
            bins = n_bins,
            kept_fraction = kept / (n_frames * n_bins) as f64,
            "spectral gate applied"
        );

        self.stft.inverse(&frames, samples.len(), samples)
    }
}

impl Default for NoiseReducer {
    fn default() -> Self {
        Self::new(DenoiseConfig::default())
    }
}

/// Indices of the lowest-power frames, ties broken by position.
fn quietest_frames(frames: &[Vec<Complex<f32>>], fraction: f32) -> Vec<usize> {
    let mut by_power: Vec<(usize, f64)> = frames
        .iter()
        .enumerate()
        .map(|(i, frame)| (i, frame.iter().map(|c| c.norm_sqr() as f64).sum()))
        .collect();
    by_power.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let count = ((frames.len() as f32 * fraction.clamp(0.0, 1.0)).ceil() as usize)
        .clamp(1, frames.len().max(1));
    by_power.into_iter().take(count).map(|(i, _)| i).collect()
}

/// Separable box average over ±`time_radius` frames and ±`freq_radius` bins.
fn smooth_mask(mask: &[Vec<f32>], time_radius: usize, freq_radius: usize) -> Vec<Vec<f32>> {
    let along_freq: Vec<Vec<f32>> = mask
        .iter()
        .map(|row| box_average(row, freq_radius))
        .collect();

    if along_freq.is_empty() || time_radius == 0 {
        return along_freq;
    }

    let n_frames = along_freq.len();
    let n_bins = along_freq[0].len();
    let mut out = vec![vec![0.0f32; n_bins]; n_frames];
    for k in 0..n_bins {
        let column: Vec<f32> = along_freq.iter().map(|row| row[k]).collect();
        for (f, v) in box_average(&column, time_radius).into_iter().enumerate() {
            out[f][k] = v;
        }
    }
    out
}

fn box_average(values: &[f32], radius: usize) -> Vec<f32> {
    if radius == 0 {
        return values.to_vec();
    }
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(radius);
            let hi = (i + radius + 1).min(values.len());
            values[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}
