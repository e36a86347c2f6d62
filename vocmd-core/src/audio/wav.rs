//! PCM16 WAV export for processed segments.

use std::path::Path;

use crate::error::Result;

/// Write mono 16-bit samples as a WAV file, creating parent directories.
pub fn write_pcm16_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
