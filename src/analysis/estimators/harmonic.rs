//! Harmonic-emphasis estimator
//!
//! Tuned for percussive backing tracks, where plain chroma gets smeared
//! by drum transients and upper harmonics. Two countermeasures:
//!
//! 1. The magnitude spectrum is averaged across frames before folding.
//!    Steady tonal partials survive the average; broadband transients
//!    largely cancel out.
//! 2. Each spectral component also credits the pitch classes of its
//!    plausible fundamentals (f/2, f/3, f/4, at decaying weight), so
//!    energy sitting on harmonics is folded back onto the root.

use super::chroma::{self, SHAATH_MAJOR, SHAATH_MINOR};
use crate::analysis::traits::KeyEstimator;
use crate::error::{KeymatchError, Result};
use crate::types::{AudioBuffer, AudioType, KeyEstimate};
use rustfft::{num_complex::Complex, FftPlanner};

/// Tunable parameters for the harmonic folding front end
#[derive(Debug, Clone, Copy)]
pub struct HarmonicParams {
    pub fft_size: usize,
    pub hop_size: usize,
    pub min_freq: f32,
    pub max_freq: f32,
    /// How many subharmonic candidates each component credits
    pub harmonics: usize,
    pub trim_threshold: f32,
}

impl Default for HarmonicParams {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_size: 2048,
            min_freq: 55.0,
            max_freq: 1800.0,
            harmonics: 4,
            trim_threshold: 0.02,
        }
    }
}

pub struct HarmonicKeyEstimator {
    params: HarmonicParams,
}

impl HarmonicKeyEstimator {
    pub fn new(params: HarmonicParams) -> Self {
        Self { params }
    }

    /// Average magnitude spectrum over all frames
    fn mean_spectrum(&self, samples: &[f32], sample_rate: u32) -> Option<Vec<f64>> {
        let fft_size = self.params.fft_size;
        if samples.len() < fft_size || sample_rate == 0 {
            return None;
        }

        let window = chroma::hann_window(fft_size);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);

        let mut mean = vec![0.0f64; fft_size / 2];
        let mut scratch = vec![Complex::new(0.0f32, 0.0); fft_size];
        let mut frames = 0usize;

        let mut pos = 0;
        while pos + fft_size <= samples.len() {
            for (i, s) in scratch.iter_mut().enumerate() {
                *s = Complex::new(samples[pos + i] * window[i], 0.0);
            }
            fft.process(&mut scratch);
            for (bin, acc) in mean.iter_mut().enumerate() {
                *acc += scratch[bin].norm() as f64;
            }
            frames += 1;
            pos += self.params.hop_size;
        }

        if frames == 0 {
            return None;
        }
        for v in &mut mean {
            *v /= frames as f64;
        }
        Some(mean)
    }
}

impl Default for HarmonicKeyEstimator {
    fn default() -> Self {
        Self::new(HarmonicParams::default())
    }
}

impl KeyEstimator for HarmonicKeyEstimator {
    fn estimate(&self, buffer: &AudioBuffer, audio_type: AudioType) -> Result<Option<KeyEstimate>> {
        if buffer.is_empty() {
            return Err(KeymatchError::invalid_audio(
                "<buffer>",
                "Zero-length audio buffer",
            ));
        }

        // Lighter trim away from percussive material
        let threshold = if audio_type == AudioType::Beat {
            self.params.trim_threshold
        } else {
            self.params.trim_threshold / 2.0
        };
        let trimmed = chroma::trim_silence(&buffer.samples, threshold);
        if trimmed.is_empty() {
            return Ok(None);
        }

        let Some(spectrum) = self.mean_spectrum(trimmed, buffer.sample_rate) else {
            return Ok(None);
        };

        let bin_width = buffer.sample_rate as f32 / self.params.fft_size as f32;
        let min_bin = (self.params.min_freq / bin_width).ceil() as usize;
        let max_bin =
            ((self.params.max_freq / bin_width).floor() as usize).min(spectrum.len() - 1);

        let mut folded = [0.0f64; 12];
        for bin in min_bin.max(1)..=max_bin {
            let freq = bin as f32 * bin_width;
            let magnitude = spectrum[bin];
            for h in 1..=self.params.harmonics {
                let fundamental = freq / h as f32;
                if fundamental < self.params.min_freq {
                    break;
                }
                folded[chroma::pitch_class_of_freq(fundamental)] += magnitude / h as f64;
            }
        }

        let Some(folded) = chroma::normalize_chroma(folded) else {
            return Ok(None);
        };

        Ok(chroma::match_profiles(&folded, &SHAATH_MAJOR, &SHAATH_MINOR))
    }

    fn name(&self) -> &'static str {
        "harmonic"
    }
}
