//! Audio sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! ## Design
//!
//! Recordings arrive at whatever rate the client captured them (commonly
//! 44.1 or 48 kHz). Every downstream stage runs at the fixed target rate
//! (16 kHz). `RateConverter` bridges that gap.
//!
//! When source rate == target rate, `RateConverter` is a passthrough and no
//! rubato session is created at all.
//!
//! ## Usage
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 16_000, 1024)?;
//! let mut out = rc.process(&raw_samples)?;
//! out.extend(rc.finish()?);
//! ```
//!
//! For whole recordings prefer [`resample`], which also trims the
//! interpolator delay so the output is time-aligned with the input.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

use crate::error::{Result, VocmdError};

/// Input frames handed to rubato per call when converting a whole buffer.
const WHOLE_BUFFER_CHUNK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when source rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Accumulation buffer; holds partial input chunks between calls.
    input_buf: Vec<f32>,
    /// How many input samples rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
    ratio: f64,
}

impl RateConverter {
    /// Create a new converter.
    ///
    /// # Parameters
    /// - `source_rate`: Sample rate of the incoming audio (Hz).
    /// - `target_rate`: Sample rate expected downstream (Hz).
    /// - `chunk_size`: Input frame count per rubato call (e.g. `1024`).
    ///
    /// # Errors
    /// Returns `VocmdError::Resample` for a zero rate or if rubato fails to
    /// initialise.
    pub fn new(source_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(VocmdError::Resample(format!(
                "invalid sample rates from={source_rate} to={target_rate}"
            )));
        }

        let ratio = target_rate as f64 / source_rate as f64;

        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                ratio,
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio, no dynamic adjustment
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VocmdError::Resample(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        debug!(
            source_rate,
            target_rate, chunk_size, max_out, "resampling enabled"
        );

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
            ratio,
        })
    }

    /// Process incoming samples, returning resampled output (may be empty).
    ///
    /// Samples are accumulated internally until a full `chunk_size` block is
    /// available for rubato. Any remainder is kept for the next call or for
    /// [`finish`](Self::finish).
    ///
    /// In passthrough mode (same rates), input is returned directly.
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();

        while self.input_buf.len() >= self.chunk_size {
            let input = [&self.input_buf[..self.chunk_size]];
            let (_consumed, produced) = resampler
                .process_into_buffer(&input[..], &mut self.output_buf, None)
                .map_err(|e| VocmdError::Resample(e.to_string()))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.drain(..self.chunk_size);
        }

        Ok(result)
    }

    /// Push out the buffered remainder plus the interpolator's tail.
    ///
    /// Output produced here includes zero-padded frames past the end of the
    /// real input; callers that need exact lengths should trim.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let mut result = Vec::new();

        if !self.input_buf.is_empty() {
            let input = [self.input_buf.as_slice()];
            let (_consumed, produced) = resampler
                .process_partial_into_buffer(Some(&input[..]), &mut self.output_buf, None)
                .map_err(|e| VocmdError::Resample(e.to_string()))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.clear();
        }

        let (_consumed, produced) = resampler
            .process_partial_into_buffer(None::<&[&[f32]]>, &mut self.output_buf, None)
            .map_err(|e| VocmdError::Resample(e.to_string()))?;
        result.extend_from_slice(&self.output_buf[0][..produced]);

        Ok(result)
    }

    /// Output frames the resampler lags behind its input.
    pub fn output_delay(&self) -> usize {
        self.resampler
            .as_ref()
            .map(|r| r.output_delay())
            .unwrap_or(0)
    }

    /// `target_rate / source_rate`.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Returns `true` when source rate == target rate (no resampling occurs).
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Resample a complete recording.
///
/// The result holds exactly `round(len * target / source)` samples and is
/// aligned with the input (the interpolator delay is removed).
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    let mut rc = RateConverter::new(source_rate, target_rate, WHOLE_BUFFER_CHUNK)?;
    if rc.is_passthrough() {
        return Ok(samples.to_vec());
    }

    let expected = (samples.len() as f64 * rc.ratio()).round() as usize;
    let delay = rc.output_delay();

    let mut out = rc.process(samples)?;
    // One flush may not cover the delay for very short inputs.
    while out.len() < expected + delay {
        let tail = rc.finish()?;
        if tail.is_empty() {
            break;
        }
        out.extend(tail);
    }

    let mut aligned: Vec<f32> = out.into_iter().skip(delay).take(expected).collect();
    aligned.resize(expected, 0.0);
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        let out = rc.process(&samples).unwrap();
        assert_eq!(out, samples);
        assert!(rc.finish().unwrap().is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            RateConverter::new(0, 16_000, 960),
            Err(VocmdError::Resample(_))
        ));
    }

    #[test]
    fn partial_accumulation_returns_empty() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let out = rc.process(&vec![0.0f32; 500]).unwrap();
        assert!(
            out.is_empty(),
            "expected empty output for partial chunk, got {}",
            out.len()
        );
    }

    #[test]
    fn ratio_48k_to_16k_correct_length() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let out = rc.process(&vec![0.0f32; 960]).unwrap();
        let expected = 320usize;
        assert!(
            (out.len() as isize - expected as isize).unsigned_abs() <= 10,
            "output len={} expected≈{}",
            out.len(),
            expected
        );
    }

    #[test]
    fn whole_buffer_length_is_exact() {
        let input = vec![0.1f32; 44_100 * 2];
        let out = resample(&input, 44_100, 16_000).unwrap();
        assert_eq!(out.len(), 32_000);

        let up = resample(&vec![0.0f32; 8_000], 8_000, 16_000).unwrap();
        assert_eq!(up.len(), 16_000);
    }

    #[test]
    fn whole_buffer_preserves_dc_level() {
        let input = vec![0.5f32; 48_000];
        let out = resample(&input, 48_000, 16_000).unwrap();
        // Ignore the edges where the interpolator sees the zero padding.
        for &s in &out[100..out.len() - 100] {
            assert!((s - 0.5).abs() < 1e-3, "sample={s}");
        }
    }

    #[test]
    fn short_input_still_resamples() {
        let out = resample(&[0.25f32; 30], 48_000, 16_000).unwrap();
        assert_eq!(out.len(), 10);
    }
}
