//! Maximum-energy segment selection.
//!
//! ## Coarse-to-fine search
//!
//! ```text
//! gated buffer ──► stage A: 1.5 s window, stride 0.2·sr ──► best 1.5 s span
//!                         │
//!                         ▼
//!               stage B: 1.0 s window, stride 0.02·sr ──► 1.0 s Segment
//! ```
//!
//! Both stages score windows by sum of squares and keep the first window
//! that reaches the maximum, so ties resolve to the earliest start and an
//! all-zero buffer selects offset 0. [`SearchStrategy::SinglePass`] skips
//! stage A and runs the fine search over the whole buffer.
//!
//! A buffer shorter than the coarse window is rejected with
//! `VocmdError::InsufficientAudio`; nothing is padded here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::AudioBuffer;
use crate::error::{Result, VocmdError};

/// How the selector walks the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Coarse window first, then a fine search inside it.
    #[default]
    CoarseToFine,
    /// Fine search over the whole buffer.
    SinglePass,
}

/// Window geometry for [`SegmentSelector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub coarse_window_secs: f32,
    /// Coarse stride as a fraction of the sample rate.
    pub coarse_stride_ratio: f32,
    pub fine_window_secs: f32,
    /// Fine stride as a fraction of the sample rate.
    pub fine_stride_ratio: f32,
    pub strategy: SearchStrategy,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            coarse_window_secs: 1.5,
            coarse_stride_ratio: 0.2,
            fine_window_secs: 1.0,
            fine_stride_ratio: 0.02,
            strategy: SearchStrategy::CoarseToFine,
        }
    }
}

/// A scored candidate window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyWindow {
    pub start: usize,
    pub len: usize,
    pub energy: f64,
}

/// An exact-length slice of the gated buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Offset of the first sample within the gated buffer.
    pub start: usize,
    pub energy: f64,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.energy == 0.0
    }
}

/// Sum of squares, accumulated in f64.
pub fn window_energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

/// Slide a `window`-sample window over `samples` in `stride` steps and return
/// the earliest window with maximum energy.
///
/// Returns `None` when `samples` is shorter than `window` or `window == 0`.
/// Candidate starts are `0, stride, 2·stride, …` up to and including the
/// last start that still fits.
pub fn max_energy_window(samples: &[f32], window: usize, stride: usize) -> Option<EnergyWindow> {
    if window == 0 || samples.len() < window {
        return None;
    }
    let stride = stride.max(1);

    let mut best = EnergyWindow {
        start: 0,
        len: window,
        energy: window_energy(&samples[..window]),
    };
    let mut start = stride;
    while start + window <= samples.len() {
        let energy = window_energy(&samples[start..start + window]);
        if energy > best.energy {
            best = EnergyWindow {
                start,
                len: window,
                energy,
            };
        }
        start += stride;
    }
    Some(best)
}

/// Two-stage loudest-second finder.
#[derive(Debug, Clone, Default)]
pub struct SegmentSelector {
    config: SelectorConfig,
}

impl SegmentSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Coarse window length in samples at `sample_rate`.
    pub fn coarse_window_len(&self, sample_rate: u32) -> usize {
        secs_to_samples(self.config.coarse_window_secs, sample_rate)
    }

    /// Output segment length in samples at `sample_rate`.
    pub fn fine_window_len(&self, sample_rate: u32) -> usize {
        secs_to_samples(self.config.fine_window_secs, sample_rate)
    }

    /// Shortest buffer [`select`](Self::select) accepts.
    pub fn min_input_len(&self, sample_rate: u32) -> usize {
        match self.config.strategy {
            SearchStrategy::CoarseToFine => self
                .coarse_window_len(sample_rate)
                .max(self.fine_window_len(sample_rate)),
            SearchStrategy::SinglePass => self.fine_window_len(sample_rate),
        }
    }

    /// Pick the loudest fine window of `buffer`.
    ///
    /// # Errors
    /// `VocmdError::InsufficientAudio` if `buffer` is shorter than
    /// [`min_input_len`](Self::min_input_len).
    pub fn select(&self, buffer: &AudioBuffer) -> Result<Segment> {
        let sr = buffer.sample_rate;
        let required = self.min_input_len(sr);
        if buffer.len() < required || required == 0 {
            return Err(VocmdError::InsufficientAudio {
                samples: buffer.len(),
                required,
            });
        }

        let fine_len = self.fine_window_len(sr);
        let fine_stride = stride_len(self.config.fine_stride_ratio, sr);

        let (region_start, region_end) = match self.config.strategy {
            SearchStrategy::CoarseToFine => {
                let coarse_len = self.coarse_window_len(sr);
                let coarse_stride = stride_len(self.config.coarse_stride_ratio, sr);
                let coarse = max_energy_window(&buffer.samples, coarse_len, coarse_stride)
                    .ok_or(VocmdError::InsufficientAudio {
                        samples: buffer.len(),
                        required,
                    })?;
                debug!(
                    start = coarse.start,
                    len = coarse.len,
                    energy = coarse.energy,
                    "coarse window selected"
                );
                (coarse.start, coarse.start + coarse.len)
            }
            SearchStrategy::SinglePass => (0, buffer.len()),
        };

        let region = &buffer.samples[region_start..region_end];
        let fine = max_energy_window(region, fine_len, fine_stride).ok_or(
            VocmdError::InsufficientAudio {
                samples: region.len(),
                required: fine_len,
            },
        )?;

        let start = region_start + fine.start;
        debug!(start, len = fine_len, energy = fine.energy, "segment selected");

        Ok(Segment {
            samples: buffer.samples[start..start + fine_len].to_vec(),
            sample_rate: sr,
            start,
            energy: fine.energy,
        })
    }
}

fn secs_to_samples(secs: f32, sample_rate: u32) -> usize {
    (secs as f64 * sample_rate as f64).round() as usize
}

fn stride_len(ratio: f32, sample_rate: u32) -> usize {
    ((ratio as f64 * sample_rate as f64).round() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 16_000;

    #[test]
    fn max_window_prefers_earliest_tie() {
        let mut samples = vec![0.0f32; 100];
        samples[10] = 1.0;
        samples[60] = 1.0;
        let best = max_energy_window(&samples, 20, 10).unwrap();
        assert_eq!(best.start, 0);
        assert_eq!(best.energy, 1.0);

        let best = max_energy_window(&samples, 5, 5).unwrap();
        assert_eq!(best.start, 10);
    }

    #[test]
    fn max_window_considers_last_fitting_start() {
        let mut samples = vec![0.0f32; 30];
        samples[29] = 1.0;
        let best = max_energy_window(&samples, 10, 10).unwrap();
        assert_eq!(best.start, 20);
    }

    #[test]
    fn max_window_too_short_is_none() {
        assert!(max_energy_window(&[0.0; 5], 6, 1).is_none());
        assert!(max_energy_window(&[0.0; 5], 0, 1).is_none());
    }

    #[test]
    fn burst_is_isolated() {
        let mut samples = vec![0.0f32; 3 * SR as usize];
        samples[16_000..32_000].iter_mut().for_each(|s| *s = 1.0);
        let seg = SegmentSelector::default()
            .select(&AudioBuffer::new(samples, SR))
            .unwrap();
        assert_eq!(seg.start, 16_000);
        assert_eq!(seg.len(), 16_000);
        assert!(seg.samples.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn silence_selects_earliest_window() {
        let buffer = AudioBuffer::silence(24_000, SR);
        let seg = SegmentSelector::default().select(&buffer).unwrap();
        assert_eq!(seg.start, 0);
        assert_eq!(seg.len(), 16_000);
        assert!(seg.is_silent());
    }

    #[test]
    fn short_buffer_is_insufficient() {
        let buffer = AudioBuffer::silence(23_999, SR);
        let err = SegmentSelector::default().select(&buffer).unwrap_err();
        assert!(matches!(
            err,
            VocmdError::InsufficientAudio {
                samples: 23_999,
                required: 24_000
            }
        ));
    }

    #[test]
    fn selection_is_deterministic() {
        let samples: Vec<f32> = (0..40_000)
            .map(|i| ((i as f32 * 0.013).sin() * (i as f32 * 0.0007).cos()) * 0.8)
            .collect();
        let buffer = AudioBuffer::new(samples, SR);
        let selector = SegmentSelector::default();
        assert_eq!(
            selector.select(&buffer).unwrap(),
            selector.select(&buffer).unwrap()
        );
    }

    #[test]
    fn single_pass_matches_on_isolated_burst() {
        let mut samples = vec![0.0f32; 3 * SR as usize];
        samples[19_200..35_200].iter_mut().for_each(|s| *s = -0.5);
        let buffer = AudioBuffer::new(samples, SR);

        let single = SegmentSelector::new(SelectorConfig {
            strategy: SearchStrategy::SinglePass,
            ..SelectorConfig::default()
        });
        assert_eq!(single.select(&buffer).unwrap().start, 19_200);
        assert_eq!(single.min_input_len(SR), 16_000);
    }
}
