//! Mid/side center-channel vocal extraction
//!
//! Low-quality, always-available fallback. Lead vocals are usually mixed
//! dead center while accompaniment is spread wider, so the mid channel
//! band-limited to the vocal range is a workable vocals estimate when the
//! model-based separator cannot run. Expect bleed from centered bass and
//! snare; good enough for key estimation, not for listening.

use crate::analysis::traits::VocalSeparator;
use crate::audio::{self, write_mono_wav};
use crate::error::{KeymatchError, Result};
use crate::types::StereoBuffer;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Tunable band and gating parameters
#[derive(Debug, Clone, Copy)]
pub struct MidSideParams {
    /// High-pass cutoff (Hz); rolls off centered kick and bass
    pub highpass_hz: f32,
    /// Low-pass cutoff (Hz); rolls off cymbal wash
    pub lowpass_hz: f32,
    /// Output RMS below this counts as "produced nothing"
    pub min_output_rms: f32,
}

impl Default for MidSideParams {
    fn default() -> Self {
        Self {
            highpass_hz: 150.0,
            lowpass_hz: 5000.0,
            min_output_rms: 1e-4,
        }
    }
}

#[derive(Default)]
pub struct MidSideSeparator {
    params: MidSideParams,
}

impl MidSideSeparator {
    pub fn new(params: MidSideParams) -> Self {
        Self { params }
    }

    fn extract_vocals(&self, stereo: &StereoBuffer) -> Vec<f32> {
        let mid: Vec<f32> = stereo
            .left
            .iter()
            .zip(stereo.right.iter())
            .map(|(l, r)| (l + r) * 0.5)
            .collect();

        let highpassed = one_pole_highpass(&mid, stereo.sample_rate, self.params.highpass_hz);
        one_pole_lowpass(&highpassed, stereo.sample_rate, self.params.lowpass_hz)
    }
}

impl VocalSeparator for MidSideSeparator {
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<PathBuf> {
        let stereo = audio::decode_stereo(input)?;
        if stereo.is_empty() {
            return Err(KeymatchError::separation("Decoded an empty stereo buffer"));
        }

        debug!(
            "Mid/side extraction over {:.1}s at {}Hz",
            stereo.duration(),
            stereo.sample_rate
        );

        let vocals = self.extract_vocals(&stereo);

        let rms = (vocals.iter().map(|s| s * s).sum::<f32>() / vocals.len() as f32).sqrt();
        if rms < self.params.min_output_rms {
            return Err(KeymatchError::separation(format!(
                "Center channel is essentially silent (RMS {:.2e})",
                rms
            )));
        }

        std::fs::create_dir_all(output_dir)
            .map_err(|e| KeymatchError::output_error(output_dir, e))?;

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("take");
        let out_path = output_dir.join(format!("{}_vocals.wav", stem));
        write_mono_wav(&out_path, &vocals, stereo.sample_rate)?;

        Ok(out_path)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "mid-side"
    }
}

/// Single-pole high-pass filter
fn one_pole_highpass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 {
        return samples.to_vec();
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev_in = samples[0];
    let mut prev_out = 0.0f32;
    for &s in samples {
        prev_out = alpha * (prev_out + s - prev_in);
        prev_in = s;
        out.push(prev_out);
    }
    out
}

/// Single-pole low-pass filter
fn one_pole_lowpass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    if samples.is_empty() || sample_rate == 0 {
        return samples.to_vec();
    }
    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = dt / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev = 0.0f32;
    for &s in samples {
        prev += alpha * (s - prev);
        out.push(prev);
    }
    out
}
