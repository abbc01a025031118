//! Unified error types for keymatch
//!
//! Error strategy:
//! - Estimator failures: recovered inside the ensemble by dropping that
//!   estimator's vote; never surfaced to the caller.
//! - Stage failures (separation, key detection): recovered through fallback
//!   chains; only fallback exhaustion surfaces, as a `Failed` pipeline result.
//! - Invalid input audio: not recoverable, surfaced immediately.

use std::path::PathBuf;
use thiserror::Error;

/// Supported audio formats for helpful error messages
pub const SUPPORTED_FORMATS: &str = "MP3, WAV, FLAC, AIFF";

/// Top-level error type for keymatch operations
#[derive(Debug, Error)]
pub enum KeymatchError {
    // =========================================================================
    // Unrecoverable input defects - surfaced immediately
    // =========================================================================
    #[error("Invalid audio input '{path}': {reason}\n  Supported formats: {SUPPORTED_FORMATS}")]
    InvalidAudio { path: PathBuf, reason: String },

    #[error("File not found: '{0}'\n  Tip: Check the path exists and is accessible")]
    FileNotFound(PathBuf),

    // =========================================================================
    // Recoverable analysis failures - consumed by fallback chains
    // =========================================================================
    /// A single estimator failed internally. Always swallowed by the
    /// ensemble; its candidate is simply excluded from the vote.
    #[error("Estimator '{method}' failed: {reason}")]
    EstimatorFailed { method: String, reason: String },

    /// Every estimator failed or returned nothing for one analysis run.
    #[error("No key candidates produced; all estimators failed or abstained")]
    NoCandidates,

    /// A vocal separation backend failed to produce an artifact.
    #[error("Vocal separation failed: {reason}")]
    SeparationFailed { reason: String },

    #[error("Separation backend unavailable: {reason}\n\n  To enable model-based separation:\n  1. Download a 2-stem vocals ONNX model\n  2. export KEYMATCH_MODEL_PATH=/path/to/model.onnx\n  3. Build with: cargo build --release --features separation")]
    SeparationUnavailable { reason: String },

    /// The external key-detection service could not be reached or gave
    /// unusable output. Treated like any other estimator failure.
    #[error("External key detector failed: {reason}")]
    ExternalDetector { reason: String },

    // =========================================================================
    // Fatal errors
    // =========================================================================
    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    OutputError { path: PathBuf, reason: String },
}

/// Result type alias for keymatch operations
pub type Result<T> = std::result::Result<T, KeymatchError>;

impl KeymatchError {
    /// True for input defects that must propagate to the caller unchanged
    /// rather than being absorbed by a fallback chain.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            KeymatchError::InvalidAudio { .. } | KeymatchError::FileNotFound(_)
        )
    }

    /// Create an invalid-audio error with context
    pub fn invalid_audio(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        KeymatchError::InvalidAudio {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an estimator failure for the named method
    pub fn estimator(method: impl Into<String>, reason: impl Into<String>) -> Self {
        KeymatchError::EstimatorFailed {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create a separation failure
    pub fn separation(reason: impl Into<String>) -> Self {
        KeymatchError::SeparationFailed {
            reason: reason.into(),
        }
    }

    /// Create an output error, describing common causes
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!(
                    "Permission denied. Check that you have write access to {}",
                    path.display()
                )
            }
            std::io::ErrorKind::NotFound => {
                format!(
                    "Directory does not exist: {}",
                    path.parent()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                )
            }
            _ => err.to_string(),
        };
        KeymatchError::OutputError { path, reason }
    }
}
