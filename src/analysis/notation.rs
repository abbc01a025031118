//! Camelot Wheel and Open Key notation
//!
//! The Camelot Wheel arranges the 24 keys so harmonic compatibility
//! becomes wheel adjacency: neighboring numbers are a perfect fifth
//! apart, and the same number in the opposite letter is the relative
//! major/minor. Both notations share wheel numbering; Camelot uses
//! A (minor) / B (major), Open Key uses m (moll) / d (dur).

use crate::types::{PitchClass, Scale};

/// Wheel position (1-12) for a key.
///
/// Successive wheel numbers step the tonic by a perfect fifth, so the
/// position follows from multiplying the pitch index by 7 (a fifth in
/// semitones) modulo 12, anchored at 8A = Am and 8B = C.
pub fn wheel_number(tonic: PitchClass, scale: Scale) -> u8 {
    let p = tonic.index();
    let n = match scale {
        Scale::Minor => (7 * p + 4) % 12,
        Scale::Major => (7 * p + 7) % 12,
    };
    (n + 1) as u8
}

/// Camelot notation, e.g. "8A" for A minor
pub fn to_camelot(tonic: PitchClass, scale: Scale) -> String {
    let letter = match scale {
        Scale::Minor => 'A',
        Scale::Major => 'B',
    };
    format!("{}{}", wheel_number(tonic, scale), letter)
}

/// Open Key notation, e.g. "8m" for A minor
pub fn to_open_key(tonic: PitchClass, scale: Scale) -> String {
    let letter = match scale {
        Scale::Minor => 'm',
        Scale::Major => 'd',
    };
    format!("{}{}", wheel_number(tonic, scale), letter)
}

/// Circular distance between two wheel positions (0-6)
pub fn wheel_distance(a: u8, b: u8) -> u8 {
    let diff = (a as i16 - b as i16).rem_euclid(12) as u8;
    diff.min(12 - diff)
}
