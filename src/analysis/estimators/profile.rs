//! Correlation estimator against rotated key profiles
//!
//! The workhorse strategy: chromagram correlated with Shaath's major and
//! minor templates over all 24 rotations. Also serves as the designated
//! default when the full ensemble produces nothing.

use super::chroma::{self, ChromaParams, SHAATH_MAJOR, SHAATH_MINOR};
use crate::analysis::traits::KeyEstimator;
use crate::error::{KeymatchError, Result};
use crate::types::{AudioBuffer, AudioType, KeyEstimate};
use tracing::trace;

/// Tunable preprocessing and extraction parameters
#[derive(Debug, Clone, Copy)]
pub struct ProfileParams {
    /// Silence trim threshold (frame RMS) for percussive material
    pub beat_trim_threshold: f32,
    /// Silence trim threshold for everything else
    pub default_trim_threshold: f32,
    /// Band-limit ceiling for beat material; percussive mixes carry
    /// little tonal information above the low mids
    pub beat_max_freq: f32,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            beat_trim_threshold: 0.02,
            default_trim_threshold: 0.005,
            beat_max_freq: 1000.0,
        }
    }
}

pub struct ProfileKeyEstimator {
    params: ProfileParams,
}

impl ProfileKeyEstimator {
    pub fn new(params: ProfileParams) -> Self {
        Self { params }
    }

    fn chroma_params(&self, audio_type: AudioType) -> ChromaParams {
        match audio_type {
            AudioType::Beat => ChromaParams {
                max_freq: self.params.beat_max_freq,
                ..ChromaParams::default()
            },
            AudioType::Vocals => ChromaParams {
                min_freq: 100.0,
                max_freq: 1500.0,
                ..ChromaParams::default()
            },
            _ => ChromaParams::default(),
        }
    }

    fn trim_threshold(&self, audio_type: AudioType) -> f32 {
        match audio_type {
            AudioType::Beat => self.params.beat_trim_threshold,
            _ => self.params.default_trim_threshold,
        }
    }
}

impl Default for ProfileKeyEstimator {
    fn default() -> Self {
        Self::new(ProfileParams::default())
    }
}

impl KeyEstimator for ProfileKeyEstimator {
    fn estimate(&self, buffer: &AudioBuffer, audio_type: AudioType) -> Result<Option<KeyEstimate>> {
        if buffer.is_empty() {
            return Err(KeymatchError::invalid_audio(
                "<buffer>",
                "Zero-length audio buffer",
            ));
        }

        let trimmed = chroma::trim_silence(&buffer.samples, self.trim_threshold(audio_type));
        if trimmed.is_empty() {
            trace!("profile: input entirely below silence threshold, abstaining");
            return Ok(None);
        }

        let params = self.chroma_params(audio_type);
        let Some(chroma) = chroma::compute_chroma(trimmed, buffer.sample_rate, &params) else {
            return Ok(None);
        };

        Ok(chroma::match_profiles(&chroma, &SHAATH_MAJOR, &SHAATH_MINOR))
    }

    fn name(&self) -> &'static str {
        "profile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PitchClass, Scale};
    use std::f32::consts::PI;

    fn triad(freqs: &[f32], secs: f32, rate: u32) -> AudioBuffer {
        let n = (secs * rate as f32) as usize;
        let samples: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / rate as f32;
                freqs
                    .iter()
                    .map(|f| (2.0 * PI * f * t).sin())
                    .sum::<f32>()
                    * (0.8 / freqs.len() as f32)
            })
            .collect();
        AudioBuffer::new(samples, rate)
    }

    #[test]
    fn detects_a_minor_triad() {
        // A3, C4, E4
        let buffer = triad(&[220.0, 261.63, 329.63], 3.0, 22050);
        let estimate = ProfileKeyEstimator::default()
            .estimate(&buffer, AudioType::General)
            .unwrap()
            .unwrap();
        assert_eq!(estimate.tonic, PitchClass::A);
        assert_eq!(estimate.scale, Scale::Minor);
    }

    #[test]
    fn empty_buffer_is_invalid_audio() {
        let buffer = AudioBuffer::new(vec![], 22050);
        let err = ProfileKeyEstimator::default()
            .estimate(&buffer, AudioType::General)
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn silent_buffer_abstains() {
        let buffer = AudioBuffer::new(vec![0.0; 44100], 22050);
        let estimate = ProfileKeyEstimator::default()
            .estimate(&buffer, AudioType::General)
            .unwrap();
        assert!(estimate.is_none());
    }
}
