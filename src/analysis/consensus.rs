//! Key consensus voting
//!
//! Resolves the disagreeing votes of the estimator ensemble into a single
//! key decision. Individual estimators are noisy, so raw confidence alone
//! is a poor predictor; several independent estimators agreeing on a key
//! is a stronger signal than one confident but isolated estimator. The
//! consensus and trust bonuses encode exactly that: agreement beats
//! isolated confidence.
//!
//! Scoring per `(tonic, scale)` group:
//!
//! ```text
//! weighted_confidence = sum(conf_i * weight_i) / sum(weight_i)
//! consensus_bonus     = group_size * bonus_per_method
//! trust_bonus         = trusted_members * trust_bonus
//! group_score         = weighted_confidence + consensus_bonus + trust_bonus
//! ```
//!
//! The winning group's score becomes the result confidence. It is NOT a
//! probability and can exceed 1.0.

use crate::analysis::notation;
use crate::config::ConsensusTuning;
use crate::error::{KeymatchError, Result};
use crate::types::{KeyCandidate, KeyResult, PitchClass, Scale};
use std::collections::BTreeMap;
use tracing::debug;

/// Aggregate ensemble votes into one [`KeyResult`].
///
/// `trusted` is the allowlist of method names that earn the trust bonus
/// for this run (the external service plus the strategy specialized for
/// the current material). Fails only on an empty candidate list.
pub fn aggregate(
    candidates: &[KeyCandidate],
    tuning: &ConsensusTuning,
    trusted: &[&str],
) -> Result<KeyResult> {
    if candidates.is_empty() {
        return Err(KeymatchError::NoCandidates);
    }

    // BTreeMap keyed by (tonic, scale) keeps iteration order independent
    // of candidate order, so aggregation is deterministic under shuffle.
    let mut groups: BTreeMap<(PitchClass, Scale), Vec<&KeyCandidate>> = BTreeMap::new();
    for candidate in candidates {
        groups
            .entry((candidate.tonic, candidate.scale))
            .or_default()
            .push(candidate);
    }

    let mut winner: Option<((PitchClass, Scale), f64, f64)> = None;

    for (&key, members) in &groups {
        let weight_sum: f64 = members.iter().map(|c| c.weight).sum();
        let weighted_confidence = if weight_sum > 0.0 {
            members
                .iter()
                .map(|c| c.confidence * c.weight)
                .sum::<f64>()
                / weight_sum
        } else {
            0.0
        };

        // Agreement credit: counted per group member, not per unique
        // method, and only when at least two estimators actually agree.
        // A lone candidate has no agreement to reward.
        let consensus_bonus = if members.len() >= 2 {
            members.len() as f64 * tuning.bonus_per_method
        } else {
            0.0
        };

        let trusted_members = members
            .iter()
            .filter(|c| trusted.contains(&c.method.as_str()))
            .count();
        let trust_bonus = trusted_members as f64 * tuning.trust_bonus;

        let group_score = weighted_confidence + consensus_bonus + trust_bonus;
        let peak_confidence = members
            .iter()
            .map(|c| c.confidence)
            .fold(f64::NEG_INFINITY, f64::max);

        debug!(
            "Group {}{}: {} votes, weighted={:.3}, consensus=+{:.2}, trust=+{:.2}, score={:.3}",
            key.0.name(),
            if key.1 == Scale::Minor { "m" } else { "" },
            members.len(),
            weighted_confidence,
            consensus_bonus,
            trust_bonus,
            group_score
        );

        // Ties broken by the group holding the single highest raw
        // confidence; effectively improbable with real scores, but the
        // rule must be deterministic.
        let beats_current = match winner {
            None => true,
            Some((_, best_score, best_peak)) => {
                group_score > best_score
                    || (group_score == best_score && peak_confidence > best_peak)
            }
        };
        if beats_current {
            winner = Some((key, group_score, peak_confidence));
        }
    }

    // Non-empty input guarantees at least one group
    let ((tonic, scale), score, _) = winner.ok_or(KeymatchError::NoCandidates)?;

    let members = &groups[&(tonic, scale)];
    let winning_method = members
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.method.cmp(&a.method))
        })
        .map(|c| c.method.clone())
        .unwrap_or_default();

    Ok(KeyResult {
        tonic,
        scale,
        confidence: score,
        method: winning_method,
        camelot: notation::to_camelot(tonic, scale),
        open_key: notation::to_open_key(tonic, scale),
    })
}
