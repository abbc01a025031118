//! Key comparison and compatibility scoring
//!
//! Consumes the beat and vocals key results and produces the final
//! compatibility verdict. Similarity is derived from Camelot wheel
//! geometry: exact match, then relative major/minor, then fifth
//! neighbors, decaying with wheel distance beyond that.

use crate::analysis::notation;
use crate::types::{Comparison, KeyResult};

/// Compare two key results
pub fn compare(beat: &KeyResult, vocals: &KeyResult) -> Comparison {
    let exact = beat.tonic == vocals.tonic && beat.scale == vocals.scale;
    let similarity = similarity(beat, vocals);

    Comparison {
        is_match: exact,
        similarity,
        score: (similarity * 100.0).round(),
    }
}

/// Harmonic similarity in [0, 1]
fn similarity(a: &KeyResult, b: &KeyResult) -> f64 {
    if a.tonic == b.tonic && a.scale == b.scale {
        return 1.0;
    }

    let pos_a = notation::wheel_number(a.tonic, a.scale);
    let pos_b = notation::wheel_number(b.tonic, b.scale);
    let distance = notation::wheel_distance(pos_a, pos_b);
    let same_letter = a.scale == b.scale;

    match (distance, same_letter) {
        // Relative major/minor: shared notes, different color
        (0, false) => 0.9,
        // Perfect fifth neighbors mix cleanly
        (1, true) => 0.75,
        (1, false) => 0.5,
        (2, true) => 0.4,
        // Anything further clashes increasingly hard
        (d, _) => (0.3 - 0.05 * d as f64).max(0.0),
    }
}
