//! Core data types for keymatch
//!
//! These types represent the domain model and flow through the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Musical primitives
// =============================================================================

/// The 12 pitch classes in Western music
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs, // C#/Db
    D,
    Ds, // D#/Eb
    E,
    F,
    Fs, // F#/Gb
    G,
    Gs, // G#/Ab
    A,
    As, // A#/Bb
    B,
}

impl PitchClass {
    /// Convert from numeric index (0 = C, 1 = C#, ..., 11 = B)
    pub fn from_index(index: usize) -> Self {
        match index % 12 {
            0 => PitchClass::C,
            1 => PitchClass::Cs,
            2 => PitchClass::D,
            3 => PitchClass::Ds,
            4 => PitchClass::E,
            5 => PitchClass::F,
            6 => PitchClass::Fs,
            7 => PitchClass::G,
            8 => PitchClass::Gs,
            9 => PitchClass::A,
            10 => PitchClass::As,
            _ => PitchClass::B,
        }
    }

    /// Convert to numeric index (0 = C, 1 = C#, ..., 11 = B)
    pub fn index(self) -> usize {
        match self {
            PitchClass::C => 0,
            PitchClass::Cs => 1,
            PitchClass::D => 2,
            PitchClass::Ds => 3,
            PitchClass::E => 4,
            PitchClass::F => 5,
            PitchClass::Fs => 6,
            PitchClass::G => 7,
            PitchClass::Gs => 8,
            PitchClass::A => 9,
            PitchClass::As => 10,
            PitchClass::B => 11,
        }
    }

    /// Standard notation (e.g., "C", "F#", "A#")
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::Cs => "C#",
            PitchClass::D => "D",
            PitchClass::Ds => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::Fs => "F#",
            PitchClass::G => "G",
            PitchClass::Gs => "G#",
            PitchClass::A => "A",
            PitchClass::As => "A#",
            PitchClass::B => "B",
        }
    }

    /// Parse a pitch class name as produced by external detectors
    /// (accepts sharps and the common flat spellings)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "C" => Some(PitchClass::C),
            "C#" | "Db" => Some(PitchClass::Cs),
            "D" => Some(PitchClass::D),
            "D#" | "Eb" => Some(PitchClass::Ds),
            "E" => Some(PitchClass::E),
            "F" => Some(PitchClass::F),
            "F#" | "Gb" => Some(PitchClass::Fs),
            "G" => Some(PitchClass::G),
            "G#" | "Ab" => Some(PitchClass::Gs),
            "A" => Some(PitchClass::A),
            "A#" | "Bb" => Some(PitchClass::As),
            "B" => Some(PitchClass::B),
            _ => None,
        }
    }
}

/// Major or minor tonal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn name(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "major" | "maj" => Some(Scale::Major),
            "minor" | "min" => Some(Scale::Minor),
            _ => None,
        }
    }
}

/// What kind of material an estimator is looking at. Governs each
/// estimator's internal preprocessing and the registry's weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioType {
    General,
    Beat,
    Instrumental,
    Vocals,
}

impl AudioType {
    pub fn name(self) -> &'static str {
        match self {
            AudioType::General => "general",
            AudioType::Beat => "beat",
            AudioType::Instrumental => "instrumental",
            AudioType::Vocals => "vocals",
        }
    }
}

// =============================================================================
// Estimation results
// =============================================================================

/// Raw output of a single estimator, before the registry attaches
/// method identity and contextual weight.
#[derive(Debug, Clone, Copy)]
pub struct KeyEstimate {
    pub tonic: PitchClass,
    pub scale: Scale,
    /// Estimator-defined confidence, conventionally in [0, 1] but the
    /// consensus engine must not assume a bounded range.
    pub confidence: f64,
}

/// One estimator's vote in a single aggregation run.
///
/// Owned exclusively by the aggregation call that collected it; the
/// `weight` is contextual (assigned per method and audio type by the
/// registry), not intrinsic to the estimate.
#[derive(Debug, Clone)]
pub struct KeyCandidate {
    pub tonic: PitchClass,
    pub scale: Scale,
    pub confidence: f64,
    pub method: String,
    pub weight: f64,
}

impl KeyCandidate {
    pub fn new(estimate: KeyEstimate, method: impl Into<String>, weight: f64) -> Self {
        Self {
            tonic: estimate.tonic,
            scale: estimate.scale,
            confidence: estimate.confidence,
            method: method.into(),
            weight,
        }
    }
}

/// The consensus engine's final decision for one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyResult {
    pub tonic: PitchClass,
    pub scale: Scale,
    /// Aggregated group score of the winning key. NOT a probability:
    /// consensus and trust bonuses can push it past 1.0.
    pub confidence: f64,
    /// Method of the highest raw-confidence candidate inside the
    /// winning group.
    pub method: String,
    /// Camelot wheel notation ("1A" - "12B")
    pub camelot: String,
    /// Open Key notation ("1m" - "12d")
    pub open_key: String,
}

impl KeyResult {
    /// Standard display form, e.g. "Am" or "F#"
    pub fn standard_notation(&self) -> String {
        match self.scale {
            Scale::Major => self.tonic.name().to_string(),
            Scale::Minor => format!("{}m", self.tonic.name()),
        }
    }
}

// =============================================================================
// Windows and audio buffers
// =============================================================================

/// The time-bounded slice of a source file selected for analysis.
///
/// Produced once per input file per pipeline run; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioWindow {
    pub source: PathBuf,
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl AudioWindow {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// Decoded mono audio ready for analysis
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono samples normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Duration in seconds
    pub duration: f64,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        let duration = if sample_rate > 0 {
            samples.len() as f64 / sample_rate as f64
        } else {
            0.0
        };
        Self {
            samples,
            sample_rate,
            duration,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Extract the sample range covered by a window. Bounds are clamped
    /// to the buffer, so a window reaching past end-of-file is truncated.
    pub fn slice_window(&self, window: &AudioWindow) -> AudioBuffer {
        let start = ((window.start_secs * self.sample_rate as f64) as usize).min(self.len());
        let end = ((window.end_secs() * self.sample_rate as f64) as usize).min(self.len());
        AudioBuffer::new(self.samples[start..end].to_vec(), self.sample_rate)
    }
}

/// Stereo audio, preserved at source fidelity for vocal separation
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    pub fn new(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            left,
            right,
            sample_rate,
        }
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate > 0 {
            self.len() as f64 / self.sample_rate as f64
        } else {
            0.0
        }
    }

    /// Extract the sample range covered by a window, clamped to the buffer
    pub fn slice_window(&self, window: &AudioWindow) -> StereoBuffer {
        let start = ((window.start_secs * self.sample_rate as f64) as usize).min(self.len());
        let end = ((window.end_secs() * self.sample_rate as f64) as usize).min(self.len());
        StereoBuffer::new(
            self.left[start..end].to_vec(),
            self.right[start..end].to_vec(),
            self.sample_rate,
        )
    }
}

// =============================================================================
// Pipeline outcome
// =============================================================================

/// Key compatibility between the vocal take and the backing track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    /// True only for an exact (tonic, scale) match
    #[serde(rename = "match")]
    pub is_match: bool,
    /// Harmonic similarity in [0, 1] derived from Camelot wheel distance
    pub similarity: f64,
    /// similarity scaled to [0, 100]
    pub score: f64,
}

/// Which pipeline stage exhausted its fallbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    VocalSeparation,
    KeyDetection,
}

impl FailureStage {
    pub fn tag(self) -> &'static str {
        match self {
            FailureStage::VocalSeparation => "vocal_separation",
            FailureStage::KeyDetection => "key_detection",
        }
    }
}

/// Everything produced by a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Window selected from the karaoke recording
    pub karaoke_window: AudioWindow,
    /// Window selected from the backing track
    pub backing_window: AudioWindow,
    pub beat_key: KeyResult,
    pub vocals_key: KeyResult,
    pub comparison: Comparison,
    /// Sliced karaoke window artifact
    pub slice_path: PathBuf,
    /// Separated vocals artifact
    pub vocals_path: PathBuf,
}

/// The sole externally visible output of a pipeline run
#[derive(Debug, Clone)]
pub enum PipelineResult {
    Completed(RunReport),
    Failed { stage: FailureStage, reason: String },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Completed(_))
    }
}
