//! Analysis trait abstractions
//!
//! These traits define the seams for swappable backends: key estimation
//! strategies and vocal separation. Instances are shared read-only across
//! concurrently running pipeline tasks, so implementations must be
//! stateless or internally synchronized.

use crate::error::Result;
use crate::types::{AudioBuffer, AudioType, KeyEstimate};
use std::path::{Path, PathBuf};

/// One independent key-estimation strategy.
///
/// Contract: returns `Ok(Some(_))` with a single key guess, `Ok(None)` to
/// abstain, or an error. Internal failures should surface as
/// `KeymatchError::EstimatorFailed` (the ensemble drops the vote and
/// continues); only unrecoverable input defects (`InvalidAudio`) propagate
/// to the caller. `audio_type` governs strategy-internal preprocessing.
pub trait KeyEstimator: Send + Sync {
    fn estimate(&self, buffer: &AudioBuffer, audio_type: AudioType) -> Result<Option<KeyEstimate>>;

    /// Method name used for weighting and trust bonuses
    fn name(&self) -> &'static str;
}

/// Vocal separation backend.
///
/// The orchestrator treats this as opaque: it may take arbitrarily long,
/// and both "backend unavailable" and "ran but produced nothing" are
/// distinct recoverable failures handled by the fallback chain.
pub trait VocalSeparator: Send + Sync {
    /// Separate vocals from the recording at `input`, writing the
    /// vocals-only artifact under `output_dir` and returning its path.
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<PathBuf>;

    /// Whether this backend can run at all (model loaded, etc.)
    fn is_available(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
