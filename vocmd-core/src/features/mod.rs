//! Fixed-shape log-mel features for the command classifier.
//!
//! ## Parameters (must match training)
//!
//! | Parameter       | Value              |
//! |-----------------|--------------------|
//! | Hann window     | 2048 samples       |
//! | FFT size        | 2048               |
//! | Hop length      | 128                |
//! | Mel bands       | 128 (Slaney)       |
//! | Mel range       | 20 Hz – Nyquist    |
//! | dB reference    | spectrogram max    |
//! | Dynamic range   | 80 dB              |
//! | Output frames   | 32                 |
//!
//! A 1 s segment at 16 kHz gives 126 centred STFT frames. After min-max
//! scaling to [0, 1] the matrix is bilinearly resized (half-pixel centres) to
//! `n_mels × frames`, so the output shape never depends on input length.
//!
//! A flat spectrogram (digital silence) has zero dynamic range; the min-max
//! denominator carries a `1e-8` epsilon and the result is all zeros.

pub mod filters;

pub use filters::build_mel_filters;

use ndarray::{Array2, Array4, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dsp::Stft;
use crate::error::{Result, VocmdError};
use crate::normalize::Pcm16Segment;

const AMIN: f32 = 1e-10;
const MINMAX_EPS: f32 = 1e-8;

/// Mel frontend parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelConfig {
    pub n_fft: usize,
    pub hop: usize,
    pub n_mels: usize,
    pub fmin: f32,
    /// Upper band edge; `None` means the Nyquist frequency.
    pub fmax: Option<f32>,
    /// Floor relative to the peak, in dB. `None` keeps the full range.
    pub top_db: Option<f32>,
    /// Time frames after resizing.
    pub frames: usize,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop: 128,
            n_mels: 128,
            fmin: 20.0,
            fmax: None,
            top_db: Some(80.0),
            frames: 32,
        }
    }
}

/// A normalized `n_mels × frames` matrix, every cell in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct MelSpectrogram {
    values: Array2<f32>,
}

impl MelSpectrogram {
    /// `(n_mels, frames)`.
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn into_array(self) -> Array2<f32> {
        self.values
    }

    /// `[1, 1, n_mels, frames]`, the layout the classifier consumes.
    pub fn to_input_tensor(&self) -> Array4<f32> {
        self.values
            .view()
            .insert_axis(Axis(0))
            .insert_axis(Axis(0))
            .to_owned()
    }

    /// True when every cell holds the same value.
    pub fn is_flat(&self) -> bool {
        let first = self.values.iter().next().copied().unwrap_or(0.0);
        self.values.iter().all(|&v| v == first)
    }
}

/// STFT → mel power → dB → min-max → resize.
pub struct MelExtractor {
    config: MelConfig,
    sample_rate: u32,
    stft: Stft,
    /// `[mel][bin]`
    filters: Vec<Vec<f32>>,
}

impl MelExtractor {
    /// Build the frontend for audio at `sample_rate`.
    ///
    /// # Errors
    /// `VocmdError::FeatureExtraction` if the parameters cannot describe a
    /// valid filterbank (zero sizes, empty band).
    pub fn new(config: MelConfig, sample_rate: u32) -> Result<Self> {
        if config.n_fft < 2 || config.hop == 0 || config.n_mels == 0 || config.frames == 0 {
            return Err(VocmdError::FeatureExtraction(format!(
                "invalid mel parameters: n_fft={} hop={} n_mels={} frames={}",
                config.n_fft, config.hop, config.n_mels, config.frames
            )));
        }
        let nyquist = sample_rate as f32 / 2.0;
        let fmax = config.fmax.unwrap_or(nyquist).min(nyquist);
        let fmin = config.fmin.max(0.0);
        if sample_rate == 0 || fmin >= fmax {
            return Err(VocmdError::FeatureExtraction(format!(
                "empty mel band: fmin={fmin} fmax={fmax} sample_rate={sample_rate}"
            )));
        }

        let filters = build_mel_filters(config.n_fft, sample_rate, config.n_mels, fmin, fmax);
        let stft = Stft::new(config.n_fft, config.hop);
        Ok(Self {
            config,
            sample_rate,
            stft,
            filters,
        })
    }

    pub fn config(&self) -> &MelConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Features of a quantized segment, read on its integer scale.
    pub fn extract_pcm16(&self, segment: &Pcm16Segment) -> Result<MelSpectrogram> {
        if segment.sample_rate != self.sample_rate {
            return Err(VocmdError::FeatureExtraction(format!(
                "segment at {} Hz, extractor built for {} Hz",
                segment.sample_rate, self.sample_rate
            )));
        }
        let samples: Vec<f32> = segment.samples.iter().map(|&s| s as f32).collect();
        self.extract(&samples)
    }

    /// Features of `samples` at the extractor's sample rate.
    ///
    /// # Errors
    /// `VocmdError::FeatureExtraction` if `samples` is shorter than one FFT
    /// window or the computation yields non-finite values.
    pub fn extract(&self, samples: &[f32]) -> Result<MelSpectrogram> {
        if samples.len() < self.config.n_fft {
            return Err(VocmdError::FeatureExtraction(format!(
                "{} samples is shorter than the {}-sample FFT window",
                samples.len(),
                self.config.n_fft
            )));
        }

        let mel = self.mel_power(samples);
        let db = power_to_db(mel, self.config.top_db);
        let scaled = min_max(db);
        let resized = resize_bilinear(&scaled, self.config.n_mels, self.config.frames);

        if resized.iter().any(|v| !v.is_finite()) {
            return Err(VocmdError::FeatureExtraction(
                "non-finite value in mel features".into(),
            ));
        }
        debug!(
            stft_frames = scaled.ncols(),
            n_mels = self.config.n_mels,
            frames = self.config.frames,
            "mel features extracted"
        );

        Ok(MelSpectrogram {
            values: resized.mapv(|v| v.clamp(0.0, 1.0)),
        })
    }

    /// Mel-band power, `[mel][frame]`.
    fn mel_power(&self, samples: &[f32]) -> Array2<f32> {
        let power = self.stft.power(samples);
        let mut mel = Array2::<f32>::zeros((self.config.n_mels, power.len()));
        for (t, frame) in power.iter().enumerate() {
            for (m, filter) in self.filters.iter().enumerate() {
                mel[[m, t]] = filter.iter().zip(frame).map(|(w, p)| w * p).sum();
            }
        }
        mel
    }
}

/// `10·log10(S / max(S))`, floored at `max_db - top_db`.
pub fn power_to_db(mut power: Array2<f32>, top_db: Option<f32>) -> Array2<f32> {
    let reference = power.iter().copied().fold(AMIN, f32::max);
    let ref_db = 10.0 * reference.log10();
    power.mapv_inplace(|p| 10.0 * p.max(AMIN).log10() - ref_db);

    if let Some(top_db) = top_db {
        let max_db = power.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = max_db - top_db.max(0.0);
        power.mapv_inplace(|v| v.max(floor));
    }
    power
}

/// `(x - min) / (max - min + 1e-8)`.
pub fn min_max(mut values: Array2<f32>) -> Array2<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() {
        return values;
    }
    let range = max - min + MINMAX_EPS;
    values.mapv_inplace(|v| (v - min) / range);
    values
}

/// Bilinear resize with half-pixel centres; sample positions outside the
/// source grid clamp to the edge.
pub fn resize_bilinear(input: &Array2<f32>, rows: usize, cols: usize) -> Array2<f32> {
    let (in_rows, in_cols) = input.dim();
    if (in_rows, in_cols) == (rows, cols) {
        return input.clone();
    }
    if in_rows == 0 || in_cols == 0 {
        return Array2::zeros((rows, cols));
    }

    let row_taps = interpolation_taps(in_rows, rows);
    let col_taps = interpolation_taps(in_cols, cols);

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let (r0, r1, fr) = row_taps[r];
        let (c0, c1, fc) = col_taps[c];
        let top = input[[r0, c0]] + (input[[r0, c1]] - input[[r0, c0]]) * fc;
        let bottom = input[[r1, c0]] + (input[[r1, c1]] - input[[r1, c0]]) * fc;
        top + (bottom - top) * fr
    })
}

/// Per output index: lower source index, upper source index, weight of upper.
fn interpolation_taps(in_len: usize, out_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = in_len as f32 / out_len as f32;
    let last = (in_len - 1) as f32;
    (0..out_len)
        .map(|i| {
            let src = ((i as f32 + 0.5) * scale - 0.5).clamp(0.0, last);
            let lo = src.floor();
            let hi = (lo + 1.0).min(last);
            (lo as usize, hi as usize, src - lo)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const SR: u32 = 16_000;

    fn extractor() -> MelExtractor {
        MelExtractor::new(MelConfig::default(), SR).unwrap()
    }

    fn chirp(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / SR as f32;
                (2.0 * std::f32::consts::PI * (200.0 + 1_500.0 * t) * t).sin() * 20_000.0
            })
            .collect()
    }

    #[test]
    fn output_has_fixed_shape_and_range() {
        let mel = extractor().extract(&chirp(16_000)).unwrap();
        assert_eq!(mel.shape(), (128, 32));
        assert!(mel.as_array().iter().all(|&v| (0.0..=1.0).contains(&v)));

        let max = mel.as_array().iter().copied().fold(0.0f32, f32::max);
        assert!(max > 0.8, "max={max}");
    }

    #[test]
    fn shape_ignores_input_length() {
        let ex = extractor();
        for len in [2_048, 16_000, 24_000] {
            assert_eq!(ex.extract(&chirp(len)).unwrap().shape(), (128, 32));
        }
    }

    #[test]
    fn silence_is_flat_zero() {
        let mel = extractor().extract(&vec![0.0; 16_000]).unwrap();
        assert!(mel.is_flat());
        assert!(mel.as_array().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn shorter_than_window_is_an_error() {
        let err = extractor().extract(&vec![0.1; 2_047]).unwrap_err();
        assert!(matches!(err, VocmdError::FeatureExtraction(_)));
    }

    #[test]
    fn rate_mismatch_is_an_error() {
        let segment = Pcm16Segment {
            samples: vec![0; 8_000],
            sample_rate: 8_000,
        };
        assert!(matches!(
            extractor().extract_pcm16(&segment),
            Err(VocmdError::FeatureExtraction(_))
        ));
    }

    #[test]
    fn invalid_band_is_rejected() {
        let config = MelConfig {
            fmin: 9_000.0,
            ..MelConfig::default()
        };
        assert!(MelExtractor::new(config, SR).is_err());
    }

    #[test]
    fn input_tensor_layout() {
        let mel = extractor().extract(&chirp(16_000)).unwrap();
        let tensor = mel.to_input_tensor();
        assert_eq!(tensor.shape(), &[1, 1, 128, 32]);
        assert_eq!(tensor[[0, 0, 5, 7]], mel.as_array()[[5, 7]]);
    }

    #[test]
    fn power_to_db_is_relative_to_peak() {
        let db = power_to_db(array![[1.0, 0.1], [0.01, 1e-12]], Some(80.0));
        assert_abs_diff_eq!(db[[0, 0]], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(db[[0, 1]], -10.0, epsilon = 1e-4);
        assert_abs_diff_eq!(db[[1, 0]], -20.0, epsilon = 1e-4);
        assert_abs_diff_eq!(db[[1, 1]], -80.0, epsilon = 1e-4);
    }

    #[test]
    fn min_max_guards_flat_input() {
        let flat = min_max(Array2::from_elem((2, 3), -42.0));
        assert!(flat.iter().all(|&v| v == 0.0));

        let scaled = min_max(array![[-80.0, -40.0], [0.0, -20.0]]);
        assert_abs_diff_eq!(scaled[[0, 0]], 0.0);
        assert_abs_diff_eq!(scaled[[0, 1]], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(scaled[[1, 0]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn resize_uses_half_pixel_centres() {
        let down = resize_bilinear(&array![[0.0, 1.0, 2.0, 3.0]], 1, 2);
        assert_abs_diff_eq!(down[[0, 0]], 0.5);
        assert_abs_diff_eq!(down[[0, 1]], 2.5);

        let up = resize_bilinear(&array![[0.0, 1.0]], 1, 4);
        let expected = [0.0, 0.25, 0.75, 1.0];
        for (got, want) in up.iter().zip(expected) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn resize_same_shape_is_identity() {
        let input = array![[0.1, 0.2], [0.3, 0.4]];
        assert_eq!(resize_bilinear(&input, 2, 2), input);
    }
}
