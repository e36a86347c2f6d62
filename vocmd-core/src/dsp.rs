//! Shared short-time Fourier helpers for the denoiser and the mel frontend.
//!
//! Frames are centred: the signal is reflect-padded by `n_fft / 2` on both
//! sides, so a buffer of `len` samples yields `1 + len / hop` frames.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Periodic Hann window of length `n`.
pub fn build_hann_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

pub fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    if pad == 0 {
        return samples.to_vec();
    }
    if samples.is_empty() {
        return vec![0.0; pad * 2];
    }
    if samples.len() == 1 {
        return vec![samples[0]; samples.len() + pad * 2];
    }

    let n = samples.len() as isize;
    let mut out = Vec::with_capacity(samples.len() + 2 * pad);
    for i in -(pad as isize)..(n + pad as isize) {
        let idx = reflect_index(i, samples.len());
        out.push(samples[idx]);
    }
    out
}

fn reflect_index(mut i: isize, len: usize) -> usize {
    let max = len as isize - 1;
    while i < 0 || i > max {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * max - i;
        }
    }
    i as usize
}

/// Forward/inverse STFT with a fixed Hann window.
pub struct Stft {
    n_fft: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            n_fft,
            hop: hop.max(1),
            window: build_hann_window(n_fft),
            forward: planner.plan_fft_forward(n_fft),
            inverse: planner.plan_fft_inverse(n_fft),
        }
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Number of non-negative frequency bins (`n_fft / 2 + 1`).
    pub fn n_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of centred frames for a signal of `len` samples.
    pub fn n_frames(&self, len: usize) -> usize {
        1 + len / self.hop
    }

    /// Centred STFT. Each frame holds the `n_bins()` non-negative bins.
    pub fn forward(&self, samples: &[f32]) -> Vec<Vec<Complex<f32>>> {
        let padded = reflect_pad(samples, self.n_fft / 2);
        let n_frames = self.n_frames(samples.len());
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let mut frames = Vec::with_capacity(n_frames);

        for frame in 0..n_frames {
            let start = frame * self.hop;
            for (i, slot) in buf.iter_mut().enumerate() {
                let s = padded.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(s * self.window[i], 0.0);
            }
            self.forward.process(&mut buf);
            frames.push(buf[..self.n_bins()].to_vec());
        }
        frames
    }

    /// Power spectrogram `|X|^2`, laid out `[frame][bin]`.
    pub fn power(&self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.forward(samples)
            .into_iter()
            .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
            .collect()
    }

    /// Weighted overlap-add inverse of [`forward`](Self::forward).
    ///
    /// Returns exactly `len` samples. Positions with negligible window
    /// coverage take the matching sample of `fallback`.
    pub fn inverse(&self, frames: &[Vec<Complex<f32>>], len: usize, fallback: &[f32]) -> Vec<f32> {
        let pad = self.n_fft / 2;
        let total = self.n_fft + self.hop * frames.len().saturating_sub(1);
        let mut acc = vec![0.0f32; total];
        let mut wsum = vec![0.0f32; total];
        let mut buf = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let scale = 1.0 / self.n_fft as f32;

        for (f, frame) in frames.iter().enumerate() {
            // Rebuild the Hermitian-symmetric full spectrum.
            for (k, slot) in buf.iter_mut().enumerate() {
                *slot = if k < frame.len() {
                    frame[k]
                } else {
                    frame[self.n_fft - k].conj()
                };
            }
            self.inverse.process(&mut buf);

            let start = f * self.hop;
            for i in 0..self.n_fft {
                let w = self.window[i];
                acc[start + i] += buf[i].re * scale * w;
                wsum[start + i] += w * w;
            }
        }

        (0..len)
            .map(|i| {
                let j = i + pad;
                match (acc.get(j), wsum.get(j)) {
                    (Some(&a), Some(&w)) if w > 1e-8 => a / w,
                    _ => fallback.get(i).copied().unwrap_or(0.0),
                }
            })
            .collect()
    }
}
