//! Shared chroma extraction for the estimator strategies
//!
//! A chromagram folds the spectrum into a 12-bin energy distribution over
//! pitch classes. Strategies differ in windowing, frequency range, and
//! spectral weighting, but they all go through this module.

use crate::types::PitchClass;
use rustfft::{num_complex::Complex, FftPlanner};

/// Parameters for chroma extraction; each strategy owns its own values
/// rather than sharing inlined constants.
#[derive(Debug, Clone, Copy)]
pub struct ChromaParams {
    /// FFT window size in samples
    pub fft_size: usize,
    /// Hop between consecutive frames
    pub hop_size: usize,
    /// Lowest frequency mapped to a pitch class (Hz). Below ~65 Hz
    /// (roughly C2) bass rumble and noise dominate.
    pub min_freq: f32,
    /// Highest frequency mapped (Hz). Above ~2 kHz harmonics rather
    /// than fundamentals dominate and smear the distribution.
    pub max_freq: f32,
    /// Apply log compression to bin magnitudes before accumulation
    pub log_compress: bool,
}

impl Default for ChromaParams {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_size: 2048,
            min_freq: 65.0,
            max_freq: 2000.0,
            log_compress: false,
        }
    }
}

/// Compute a normalized 12-bin chroma vector over all frames.
///
/// Returns `None` when the input is shorter than one frame or carries no
/// energy in the configured band; callers treat that as an abstention.
pub fn compute_chroma(samples: &[f32], sample_rate: u32, params: &ChromaParams) -> Option<[f64; 12]> {
    if samples.len() < params.fft_size || sample_rate == 0 {
        return None;
    }

    let window = hann_window(params.fft_size);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(params.fft_size);

    let bin_width = sample_rate as f32 / params.fft_size as f32;
    let min_bin = (params.min_freq / bin_width).ceil() as usize;
    let max_bin = ((params.max_freq / bin_width).floor() as usize).min(params.fft_size / 2);

    let mut chroma = [0.0f64; 12];
    let mut scratch = vec![Complex::new(0.0f32, 0.0); params.fft_size];

    let mut pos = 0;
    while pos + params.fft_size <= samples.len() {
        for (i, s) in scratch.iter_mut().enumerate() {
            *s = Complex::new(samples[pos + i] * window[i], 0.0);
        }
        fft.process(&mut scratch);

        for (bin, value) in scratch
            .iter()
            .enumerate()
            .take(max_bin + 1)
            .skip(min_bin.max(1))
        {
            let freq = bin as f32 * bin_width;
            let magnitude = value.norm();
            let energy = if params.log_compress {
                (1.0 + 10.0 * magnitude).ln() as f64
            } else {
                magnitude as f64
            };
            chroma[pitch_class_of_freq(freq)] += energy;
        }

        pos += params.hop_size;
    }

    normalize_chroma(chroma)
}

/// Map a frequency to its nearest pitch class (0 = C)
pub fn pitch_class_of_freq(freq: f32) -> usize {
    // MIDI note number: 69 = A4 = 440 Hz
    let midi = 69.0 + 12.0 * (freq / 440.0).log2();
    let rounded = midi.round() as i64;
    (rounded.rem_euclid(12)) as usize
}

/// Scale a chroma vector to unit sum; `None` if it carries no energy
pub fn normalize_chroma(chroma: [f64; 12]) -> Option<[f64; 12]> {
    let total: f64 = chroma.iter().sum();
    if total <= f64::EPSILON {
        return None;
    }
    let mut out = chroma;
    for v in &mut out {
        *v /= total;
    }
    Some(out)
}

/// Hann window coefficients
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = std::f32::consts::PI * i as f32 / size as f32;
            x.sin() * x.sin()
        })
        .collect()
}

/// Trim leading and trailing frames whose RMS falls below `threshold`.
///
/// Returns the retained sample range; an all-silent input yields an
/// empty slice.
pub fn trim_silence(samples: &[f32], threshold: f32) -> &[f32] {
    const FRAME: usize = 1024;
    if samples.len() < FRAME {
        return samples;
    }

    let frame_rms = |frame: &[f32]| -> f32 {
        (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
    };

    let first = samples
        .chunks(FRAME)
        .position(|f| frame_rms(f) >= threshold);
    let Some(first) = first else {
        return &samples[0..0];
    };
    let last = samples
        .chunks(FRAME)
        .rposition(|f| frame_rms(f) >= threshold)
        .unwrap_or(first);

    let start = first * FRAME;
    let end = ((last + 1) * FRAME).min(samples.len());
    &samples[start..end]
}

/// Pearson correlation between a chroma vector and a key profile
pub fn correlate(chroma: &[f64; 12], profile: &[f64; 12]) -> f64 {
    let mean_a = chroma.iter().sum::<f64>() / 12.0;
    let mean_b = profile.iter().sum::<f64>() / 12.0;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..12 {
        let da = chroma[i] - mean_a;
        let db = profile[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        0.0
    } else {
        cov / denom
    }
}

/// Rotate a template so its tonic sits at `tonic_index`
pub fn rotate_profile(profile: &[f64; 12], tonic_index: usize) -> [f64; 12] {
    let mut out = [0.0; 12];
    for (i, v) in out.iter_mut().enumerate() {
        *v = profile[(12 + i - tonic_index) % 12];
    }
    out
}

/// Best-matching key for a chroma vector against rotated major/minor
/// profiles. Returns tonic, scale, and a confidence in [0, 1] combining
/// the best correlation with its margin over the runner-up.
pub fn match_profiles(
    chroma: &[f64; 12],
    major: &[f64; 12],
    minor: &[f64; 12],
) -> Option<crate::types::KeyEstimate> {
    use crate::types::{KeyEstimate, Scale};

    let mut scores: Vec<(PitchClass, Scale, f64)> = Vec::with_capacity(24);
    for tonic in 0..12 {
        let rotated = rotate_profile(major, tonic);
        scores.push((
            PitchClass::from_index(tonic),
            Scale::Major,
            correlate(chroma, &rotated),
        ));
        let rotated = rotate_profile(minor, tonic);
        scores.push((
            PitchClass::from_index(tonic),
            Scale::Minor,
            correlate(chroma, &rotated),
        ));
    }

    scores.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    let (tonic, scale, best) = scores[0];
    let second = scores[1].2;

    if best <= 0.0 {
        return None;
    }

    // Half the confidence comes from absolute correlation strength, half
    // from how clearly the winner separates from the runner-up.
    let margin = ((best - second) / best.abs().max(f64::EPSILON)).clamp(0.0, 1.0);
    let confidence = (0.5 * best.clamp(0.0, 1.0) + 0.5 * margin).clamp(0.0, 1.0);

    Some(KeyEstimate {
        tonic,
        scale,
        confidence,
    })
}

// =============================================================================
// Key profile templates
// =============================================================================

/// Shaath's empirically derived profiles (libKeyFinder). Better suited to
/// popular and electronic material than the original Krumhansl-Schmuckler
/// weights.
pub const SHAATH_MAJOR: [f64; 12] = [
    6.6, 2.0, 3.5, 2.3, 4.6, 4.0, 2.5, 5.2, 2.4, 3.7, 2.3, 3.2,
];
pub const SHAATH_MINOR: [f64; 12] = [
    6.5, 2.7, 3.5, 5.4, 2.6, 3.5, 2.5, 4.7, 4.0, 2.7, 3.4, 3.2,
];

/// Temperley's profiles, a useful second opinion with flatter weighting
pub const TEMPERLEY_MAJOR: [f64; 12] = [
    5.0, 2.0, 3.5, 2.0, 4.5, 4.0, 2.0, 4.5, 2.0, 3.5, 1.5, 4.0,
];
pub const TEMPERLEY_MINOR: [f64; 12] = [
    5.0, 2.0, 3.5, 4.5, 2.0, 4.0, 2.0, 4.5, 3.5, 2.0, 1.5, 4.0,
];
