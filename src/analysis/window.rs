//! Audio window selection
//!
//! Chooses which portion of a source file to analyze so vocals and
//! backing track are compared over a consistent time span.
//!
//! Policy:
//! - File no longer than the target: analyze all of it.
//! - File up to 60 s: center the window; intros and outros on short
//!   clips tend to carry dead air at the edges.
//! - Longer files: start at a fixed 15 s, clamped so the window never
//!   runs past end-of-file; long recordings have reliably settled into
//!   the main performance by then.
//!
//! The policy is a tuned heuristic, kept stable for behavioral
//! compatibility with existing scores.

use crate::types::AudioWindow;
use std::path::Path;
use tracing::debug;

/// Duration below which a window is centered rather than offset
const CENTERED_MAX_TOTAL_SECS: f64 = 60.0;

/// Fixed window start for long files
const LONG_FILE_START_SECS: f64 = 15.0;

/// Select `(start, duration)` for a file of `total` seconds given a
/// `target` window duration.
pub fn select(total_secs: f64, target_secs: f64) -> (f64, f64) {
    if total_secs <= target_secs {
        return (0.0, total_secs);
    }

    if total_secs <= CENTERED_MAX_TOTAL_SECS {
        return ((total_secs - target_secs) / 2.0, target_secs);
    }

    // Clamp so start + duration never exceeds end-of-file
    let start = LONG_FILE_START_SECS.min(total_secs - target_secs);
    (start, target_secs)
}

/// Build an [`AudioWindow`] for a source file
pub fn select_window(source: &Path, total_secs: f64, target_secs: f64) -> AudioWindow {
    let (start_secs, duration_secs) = select(total_secs, target_secs);
    debug!(
        "Window for {}: {:.1}s..{:.1}s of {:.1}s",
        source.display(),
        start_secs,
        start_secs + duration_secs,
        total_secs
    );
    AudioWindow {
        source: source.to_path_buf(),
        start_secs,
        duration_secs,
    }
}
