//! Slaney-style triangular mel filterbank.

/// Build `n_mels` area-normalized triangular filters over the
/// `fft_size / 2 + 1` non-negative FFT bins, spanning `fmin..=fmax` Hz.
///
/// Returned as `[mel][bin]`.
pub fn build_mel_filters(
    fft_size: usize,
    sr: u32,
    n_mels: usize,
    fmin: f32,
    fmax: f32,
) -> Vec<Vec<f32>> {
    let n_freqs = fft_size / 2 + 1;
    let mel_min = hz_to_mel_slaney(fmin);
    let mel_max = hz_to_mel_slaney(fmax);

    let hz_pts: Vec<f32> = (0..=(n_mels + 1))
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32)
        .map(mel_to_hz_slaney)
        .collect();
    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|k| k as f32 * sr as f32 / fft_size as f32)
        .collect();

    let mut filters = vec![vec![0f32; n_freqs]; n_mels];
    for (m, filter) in filters.iter_mut().enumerate() {
        let lower = hz_pts[m];
        let center = hz_pts[m + 1];
        let upper = hz_pts[m + 2];
        let down_denom = (center - lower).max(1e-10);
        let up_denom = (upper - center).max(1e-10);
        let enorm = 2.0 / (upper - lower).max(1e-10);

        for (w_out, &freq) in filter.iter_mut().zip(&fft_freqs) {
            let w = if freq >= lower && freq <= center {
                (freq - lower) / down_denom
            } else if freq > center && freq <= upper {
                (upper - freq) / up_denom
            } else {
                0.0
            };
            *w_out = (w * enorm).max(0.0);
        }
    }
    filters
}

pub fn hz_to_mel_slaney(hz: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1_000.0;
    let min_log_mel = min_log_hz / f_sp; // 15
    let logstep = (6.4_f32).ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

pub fn mel_to_hz_slaney(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1_000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4_f32).ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn slaney_scale_round_trips() {
        for hz in [20.0f32, 500.0, 1_000.0, 4_000.0, 8_000.0] {
            assert_relative_eq!(
                mel_to_hz_slaney(hz_to_mel_slaney(hz)),
                hz,
                max_relative = 1e-4
            );
        }
        assert_relative_eq!(hz_to_mel_slaney(1_000.0), 15.0, epsilon = 1e-5);
    }

    #[test]
    fn filters_cover_requested_band_only() {
        let filters = build_mel_filters(2048, 16_000, 128, 20.0, 8_000.0);
        assert_eq!(filters.len(), 128);
        assert!(filters.iter().all(|f| f.len() == 1025));

        // Bin 0 (DC) lies below 20 Hz.
        assert!(filters.iter().all(|f| f[0] == 0.0));
        // Every filter has some support.
        assert!(filters.iter().all(|f| f.iter().any(|&w| w > 0.0)));
        assert!(filters.iter().flatten().all(|&w| w >= 0.0 && w.is_finite()));
    }
}
