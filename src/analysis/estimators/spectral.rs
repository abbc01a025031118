//! Alternate-transform estimator
//!
//! Second opinion on the same chromagram idea with deliberately different
//! front-end choices: a longer analysis window for finer low-frequency
//! resolution, log-compressed magnitudes so quiet tonal content is not
//! drowned by transients, and Temperley's flatter profiles. The point is
//! decorrelation from the `profile` strategy, not outright accuracy.

use super::chroma::{self, ChromaParams, TEMPERLEY_MAJOR, TEMPERLEY_MINOR};
use crate::analysis::traits::KeyEstimator;
use crate::error::{KeymatchError, Result};
use crate::types::{AudioBuffer, AudioType, KeyEstimate};

/// Tunable extraction parameters
#[derive(Debug, Clone, Copy)]
pub struct SpectralParams {
    pub fft_size: usize,
    pub hop_size: usize,
    pub trim_threshold: f32,
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self {
            fft_size: 8192,
            hop_size: 4096,
            trim_threshold: 0.005,
        }
    }
}

pub struct SpectralKeyEstimator {
    params: SpectralParams,
}

impl SpectralKeyEstimator {
    pub fn new(params: SpectralParams) -> Self {
        Self { params }
    }
}

impl Default for SpectralKeyEstimator {
    fn default() -> Self {
        Self::new(SpectralParams::default())
    }
}

impl KeyEstimator for SpectralKeyEstimator {
    fn estimate(&self, buffer: &AudioBuffer, audio_type: AudioType) -> Result<Option<KeyEstimate>> {
        if buffer.is_empty() {
            return Err(KeymatchError::invalid_audio(
                "<buffer>",
                "Zero-length audio buffer",
            ));
        }

        let trimmed = chroma::trim_silence(&buffer.samples, self.params.trim_threshold);
        if trimmed.is_empty() {
            return Ok(None);
        }

        let chroma_params = ChromaParams {
            fft_size: self.params.fft_size,
            hop_size: self.params.hop_size,
            log_compress: true,
            // Harmonics above the low mids mislead percussive mixes here
            // just as they do for the profile strategy.
            max_freq: if audio_type == AudioType::Beat {
                1200.0
            } else {
                2000.0
            },
            ..ChromaParams::default()
        };

        let Some(chroma) = chroma::compute_chroma(trimmed, buffer.sample_rate, &chroma_params)
        else {
            return Ok(None);
        };

        Ok(chroma::match_profiles(
            &chroma,
            &TEMPERLEY_MAJOR,
            &TEMPERLEY_MINOR,
        ))
    }

    fn name(&self) -> &'static str {
        "spectral"
    }
}
