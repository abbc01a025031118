//! Runtime configuration settings
//!
//! All empirically tuned constants live here as named fields with defaults,
//! so strategies can be A/B compared without touching estimator code. The
//! default values are starting points, not calibrated invariants.

use crate::types::AudioType;
use std::path::PathBuf;
use std::time::Duration;

/// Consensus engine tuning
#[derive(Debug, Clone, Copy)]
pub struct ConsensusTuning {
    /// Additive credit per agreeing candidate in a key group. Applied per
    /// group member, not per unique method.
    pub bonus_per_method: f64,
    /// Additive credit per trusted-method candidate in a group.
    pub trust_bonus: f64,
}

impl Default for ConsensusTuning {
    fn default() -> Self {
        Self {
            bonus_per_method: 0.3,
            trust_bonus: 0.2,
        }
    }
}

/// Contextual vote weights per estimation method.
///
/// Each entry is `(general_or_default, specialized)`: the specialized value
/// applies when the method is analyzing the material it was tuned for.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorWeights {
    pub profile: f64,
    pub spectral: f64,
    pub vocal_f0_default: f64,
    pub vocal_f0_on_vocals: f64,
    pub harmonic_default: f64,
    pub harmonic_on_beat: f64,
    pub external: f64,
}

impl Default for EstimatorWeights {
    fn default() -> Self {
        Self {
            profile: 1.0,
            spectral: 0.9,
            vocal_f0_default: 0.6,
            vocal_f0_on_vocals: 1.2,
            harmonic_default: 0.7,
            harmonic_on_beat: 1.2,
            external: 1.5,
        }
    }
}

impl EstimatorWeights {
    /// Weight for a method name under the given audio type
    pub fn for_method(&self, method: &str, audio_type: AudioType) -> f64 {
        match method {
            "profile" => self.profile,
            "spectral" => self.spectral,
            "vocal-f0" => {
                if audio_type == AudioType::Vocals {
                    self.vocal_f0_on_vocals
                } else {
                    self.vocal_f0_default
                }
            }
            "harmonic" => {
                if audio_type == AudioType::Beat {
                    self.harmonic_on_beat
                } else {
                    self.harmonic_default
                }
            }
            "external" => self.external,
            _ => 1.0,
        }
    }
}

/// Runtime settings for a pipeline run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Karaoke recording path
    pub karaoke: PathBuf,
    /// Backing track path
    pub backing: PathBuf,
    /// Output directory (artifacts land in a run-scoped subdirectory)
    pub output: PathBuf,
    /// Target analysis window duration in seconds
    pub window_duration: f64,
    /// External key-detection command, if any
    pub detector_cmd: Option<String>,
    /// Timeout for the external detector
    pub detector_timeout: Duration,
    /// Consensus engine tuning
    pub consensus: ConsensusTuning,
    /// Per-method vote weights
    pub weights: EstimatorWeights,
}

impl Settings {
    /// Create settings from CLI arguments
    pub fn from_cli(cli: &super::cli::Cli) -> Self {
        Self {
            karaoke: cli.karaoke.clone(),
            backing: cli.backing.clone(),
            output: cli.output.clone(),
            window_duration: cli.window_duration,
            detector_cmd: cli.detector_cmd.clone(),
            detector_timeout: Duration::from_secs(cli.detector_timeout),
            consensus: ConsensusTuning::default(),
            weights: EstimatorWeights::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            karaoke: PathBuf::from("karaoke.wav"),
            backing: PathBuf::from("backing.wav"),
            output: PathBuf::from("./keymatch_out"),
            window_duration: 30.0,
            detector_cmd: None,
            detector_timeout: Duration::from_secs(20),
            consensus: ConsensusTuning::default(),
            weights: EstimatorWeights::default(),
        }
    }
}
