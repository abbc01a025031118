//! WAV artifact writing
//!
//! Sliced windows and separated vocals are persisted as 16-bit mono WAV
//! so they can be inspected and re-fed to external detectors.

use crate::error::{KeymatchError, Result};
use std::path::Path;

/// Write mono f32 samples as a 16-bit PCM WAV file
pub fn write_mono_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| {
        KeymatchError::OutputError {
            path: path.to_path_buf(),
            reason: format!("Failed to create WAV file: {}", e),
        }
    })?;

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .map_err(|e| KeymatchError::OutputError {
                path: path.to_path_buf(),
                reason: format!("Failed to write sample: {}", e),
            })?;
    }

    writer.finalize().map_err(|e| KeymatchError::OutputError {
        path: path.to_path_buf(),
        reason: format!("Failed to finalize WAV file: {}", e),
    })?;

    Ok(())
}

/// Write stereo f32 samples as a 16-bit PCM WAV file
pub fn write_stereo_wav(
    path: &Path,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| {
        KeymatchError::OutputError {
            path: path.to_path_buf(),
            reason: format!("Failed to create WAV file: {}", e),
        }
    })?;

    for (l, r) in left.iter().zip(right.iter()) {
        for &sample in &[*l, *r] {
            writer
                .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .map_err(|e| KeymatchError::OutputError {
                    path: path.to_path_buf(),
                    reason: format!("Failed to write sample: {}", e),
                })?;
        }
    }

    writer.finalize().map_err(|e| KeymatchError::OutputError {
        path: path.to_path_buf(),
        reason: format!("Failed to finalize WAV file: {}", e),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_readable_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.wav");
        let samples: Vec<f32> = (0..2205)
            .map(|i| (i as f32 * 0.01).sin() * 0.5)
            .collect();

        write_mono_wav(&path, &samples, 22050).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 2205);
    }

    #[test]
    fn clamps_out_of_range_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hot.wav");
        write_mono_wav(&path, &[2.0, -2.0], 22050).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples[0], i16::MAX);
        assert_eq!(samples[1], -i16::MAX);
    }
}
