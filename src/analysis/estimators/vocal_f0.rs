//! Pitch-fundamental estimator for monophonic vocal lines
//!
//! A sung melody carries one fundamental at a time, so instead of folding
//! the whole spectrum into chroma this strategy tracks f0 frame by frame
//! with normalized autocorrelation, builds a pitch-class dwell histogram
//! from the voiced frames, and matches that histogram against the key
//! profiles. Confidence is scaled by the voiced ratio: a take that was
//! mostly silence or noise should not vote loudly.

use super::chroma::{self, SHAATH_MAJOR, SHAATH_MINOR};
use crate::analysis::traits::KeyEstimator;
use crate::error::{KeymatchError, Result};
use crate::types::{AudioBuffer, AudioType, KeyEstimate};
use tracing::trace;

/// Tunable tracking parameters
#[derive(Debug, Clone, Copy)]
pub struct VocalF0Params {
    /// Analysis frame length in samples
    pub frame_size: usize,
    /// Hop between frames
    pub hop_size: usize,
    /// Lowest trackable fundamental (Hz)
    pub min_f0: f32,
    /// Highest trackable fundamental (Hz)
    pub max_f0: f32,
    /// Minimum normalized autocorrelation to call a frame voiced
    pub clarity_threshold: f32,
    /// Frame RMS below this is skipped outright
    pub energy_threshold: f32,
    /// Minimum fraction of voiced frames for a usable estimate
    pub min_voiced_ratio: f64,
}

impl Default for VocalF0Params {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            hop_size: 1024,
            min_f0: 70.0,
            max_f0: 800.0,
            clarity_threshold: 0.5,
            energy_threshold: 0.005,
            min_voiced_ratio: 0.1,
        }
    }
}

pub struct VocalF0Estimator {
    params: VocalF0Params,
}

impl VocalF0Estimator {
    pub fn new(params: VocalF0Params) -> Self {
        Self { params }
    }

    /// Track the fundamental of one frame; `None` for unvoiced frames.
    /// Returns `(f0, clarity)`.
    fn track_frame(&self, frame: &[f32], sample_rate: u32) -> Option<(f32, f32)> {
        let energy: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        if energy.sqrt() < self.params.energy_threshold {
            return None;
        }

        let min_lag = ((sample_rate as f32 / self.params.max_f0) as usize).max(2);
        let max_lag =
            ((sample_rate as f32 / self.params.min_f0) as usize).min(frame.len() - 1);
        if min_lag >= max_lag {
            return None;
        }

        let r0: f32 = frame.iter().map(|s| s * s).sum();
        if r0 <= f32::EPSILON {
            return None;
        }

        let mut best_lag = 0usize;
        let mut best_corr = 0.0f32;
        for lag in min_lag..=max_lag {
            let mut r = 0.0f32;
            for i in 0..frame.len() - lag {
                r += frame[i] * frame[i + lag];
            }
            let normalized = r / r0;
            if normalized > best_corr {
                best_corr = normalized;
                best_lag = lag;
            }
        }

        if best_corr < self.params.clarity_threshold || best_lag == 0 {
            return None;
        }

        Some((sample_rate as f32 / best_lag as f32, best_corr))
    }
}

impl Default for VocalF0Estimator {
    fn default() -> Self {
        Self::new(VocalF0Params::default())
    }
}

impl KeyEstimator for VocalF0Estimator {
    fn estimate(&self, buffer: &AudioBuffer, _audio_type: AudioType) -> Result<Option<KeyEstimate>> {
        if buffer.is_empty() {
            return Err(KeymatchError::invalid_audio(
                "<buffer>",
                "Zero-length audio buffer",
            ));
        }
        if buffer.len() < self.params.frame_size {
            return Ok(None);
        }

        let mut histogram = [0.0f64; 12];
        let mut voiced = 0usize;
        let mut total = 0usize;

        let mut pos = 0;
        while pos + self.params.frame_size <= buffer.len() {
            let frame = &buffer.samples[pos..pos + self.params.frame_size];
            total += 1;
            if let Some((f0, clarity)) = self.track_frame(frame, buffer.sample_rate) {
                histogram[chroma::pitch_class_of_freq(f0)] += clarity as f64;
                voiced += 1;
            }
            pos += self.params.hop_size;
        }

        if total == 0 {
            return Ok(None);
        }
        let voiced_ratio = voiced as f64 / total as f64;
        if voiced_ratio < self.params.min_voiced_ratio {
            trace!(
                "vocal-f0: only {:.0}% voiced frames, abstaining",
                voiced_ratio * 100.0
            );
            return Ok(None);
        }

        let Some(histogram) = chroma::normalize_chroma(histogram) else {
            return Ok(None);
        };

        let estimate = chroma::match_profiles(&histogram, &SHAATH_MAJOR, &SHAATH_MINOR);
        Ok(estimate.map(|e| KeyEstimate {
            confidence: e.confidence * voiced_ratio.min(1.0),
            ..e
        }))
    }

    fn name(&self) -> &'static str {
        "vocal-f0"
    }
}
