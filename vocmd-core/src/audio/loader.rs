//! WAV decoding via `hound`.
//!
//! Accepts 8/16/24/32-bit integer PCM and 32-bit float WAV files with any
//! channel count. Integer samples are scaled by `2^(bits-1)` into [-1.0, 1.0),
//! channels are averaged (see the module docs of [`crate::audio`]) and the
//! result is resampled to the requested target rate.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use tracing::debug;

use super::{downmix_interleaved, resample, AudioBuffer};
use crate::error::{Result, VocmdError};

/// Decode a WAV file from disk into a mono buffer at `target_rate`.
///
/// # Errors
/// - `VocmdError::Io` if the file cannot be opened.
/// - `VocmdError::Decode` for a corrupt or unsupported container.
pub fn load_path(path: impl AsRef<Path>, target_rate: u32) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let file = File::open(path)?;
    debug!(path = ?path, "decoding wav file");
    load_reader(BufReader::new(file), target_rate)
}

/// Decode an in-memory WAV byte stream into a mono buffer at `target_rate`.
pub fn load_bytes(bytes: &[u8], target_rate: u32) -> Result<AudioBuffer> {
    load_reader(Cursor::new(bytes), target_rate)
}

/// Decode any WAV byte source into a mono buffer at `target_rate`.
pub fn load_reader<R: Read>(reader: R, target_rate: u32) -> Result<AudioBuffer> {
    let (mono, source_rate) = decode_mono(reader)?;
    let samples = resample(&mono, source_rate, target_rate)?;

    debug!(
        source_rate,
        target_rate,
        source_samples = mono.len(),
        samples = samples.len(),
        "decoded audio"
    );

    Ok(AudioBuffer::new(samples, target_rate))
}

/// Decode to mono f32 at the file's own sample rate.
pub fn decode_mono<R: Read>(reader: R) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);

    if channels == 0 {
        return Err(VocmdError::Decode("wav header declares zero channels".into()));
    }
    if spec.sample_rate == 0 {
        return Err(VocmdError::Decode("wav header declares a zero sample rate".into()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(VocmdError::Decode(format!(
                    "unsupported float bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(VocmdError::Decode(format!(
                    "unsupported integer bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            if spec.bits_per_sample <= 16 {
                let scale = (1_i32 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            } else {
                let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        }
    };

    Ok((downmix_interleaved(&interleaved, channels), spec.sample_rate))
}
