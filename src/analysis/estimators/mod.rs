//! Key estimation strategies and the ensemble registry
//!
//! One `KeyEstimator` trait, many named strategies. The registry owns a
//! strategy set, assigns contextual vote weights per (method, audio type),
//! and feeds the collected candidates to the consensus engine. Estimator
//! failures cost one vote, never the run.

pub mod chroma;
pub mod external;
pub mod harmonic;
pub mod profile;
pub mod spectral;
pub mod vocal_f0;

pub use external::ExternalDetector;
pub use harmonic::HarmonicKeyEstimator;
pub use profile::ProfileKeyEstimator;
pub use spectral::SpectralKeyEstimator;
pub use vocal_f0::VocalF0Estimator;

use crate::analysis::{consensus, notation, traits::KeyEstimator};
use crate::config::{ConsensusTuning, EstimatorWeights, Settings};
use crate::error::Result;
use crate::types::{AudioBuffer, AudioType, KeyCandidate, KeyResult};
use tracing::{debug, warn};

/// The registered estimator ensemble for one pipeline run.
///
/// Shared read-only across concurrent tasks; every registered strategy is
/// stateless per call.
pub struct Ensemble {
    estimators: Vec<Box<dyn KeyEstimator>>,
    weights: EstimatorWeights,
    tuning: ConsensusTuning,
}

impl Ensemble {
    /// Register the full strategy set described by the settings
    pub fn from_settings(settings: &Settings) -> Self {
        let mut estimators: Vec<Box<dyn KeyEstimator>> = vec![
            Box::new(ProfileKeyEstimator::default()),
            Box::new(SpectralKeyEstimator::default()),
            Box::new(VocalF0Estimator::default()),
            Box::new(HarmonicKeyEstimator::default()),
        ];

        if let Some(cmd) = &settings.detector_cmd {
            debug!("Registering external key detector: {}", cmd);
            estimators.push(Box::new(ExternalDetector::new(
                cmd.clone(),
                settings.detector_timeout,
            )));
        }

        Self {
            estimators,
            weights: settings.weights,
            tuning: settings.consensus,
        }
    }

    /// Assemble from explicit parts (used by tests and special setups)
    pub fn from_parts(
        estimators: Vec<Box<dyn KeyEstimator>>,
        weights: EstimatorWeights,
        tuning: ConsensusTuning,
    ) -> Self {
        Self {
            estimators,
            weights,
            tuning,
        }
    }

    /// Trusted-method allowlist for one audio type: the external service
    /// plus the strategy specialized for this material.
    fn trusted_methods(audio_type: AudioType) -> &'static [&'static str] {
        match audio_type {
            AudioType::Vocals => &["external", "vocal-f0"],
            AudioType::Beat => &["external", "harmonic"],
            _ => &["external"],
        }
    }

    /// Run every applicable strategy and resolve the votes.
    ///
    /// Fails with `NoCandidates` when every strategy failed or abstained;
    /// `InvalidAudio` from any strategy propagates unchanged.
    pub fn detect(&self, buffer: &AudioBuffer, audio_type: AudioType) -> Result<KeyResult> {
        let mut candidates: Vec<KeyCandidate> = Vec::with_capacity(self.estimators.len());

        for estimator in &self.estimators {
            // The external service is empirically unreliable on separated
            // vocal stems, so it is never consulted for them.
            if audio_type == AudioType::Vocals && estimator.name() == "external" {
                continue;
            }

            match estimator.estimate(buffer, audio_type) {
                Ok(Some(estimate)) => {
                    let weight = self.weights.for_method(estimator.name(), audio_type);
                    debug!(
                        "{} ({}): {}{} conf={:.3} weight={:.2}",
                        estimator.name(),
                        audio_type.name(),
                        estimate.tonic.name(),
                        if estimate.scale == crate::types::Scale::Minor {
                            "m"
                        } else {
                            ""
                        },
                        estimate.confidence,
                        weight
                    );
                    candidates.push(KeyCandidate::new(estimate, estimator.name(), weight));
                }
                Ok(None) => {
                    debug!("{} abstained on {} audio", estimator.name(), audio_type.name());
                }
                Err(e) if e.is_invalid_input() => return Err(e),
                Err(e) => {
                    warn!("Estimator {} failed, dropping its vote: {}", estimator.name(), e);
                }
            }
        }

        consensus::aggregate(&candidates, &self.tuning, Self::trusted_methods(audio_type))
    }
}

/// Last-resort detection outside the ensemble: the designated default
/// strategy (profile correlation) run once on its own.
pub fn run_default(buffer: &AudioBuffer, audio_type: AudioType) -> Result<Option<KeyResult>> {
    let estimator = ProfileKeyEstimator::default();
    let estimate = match estimator.estimate(buffer, audio_type) {
        Ok(estimate) => estimate,
        Err(e) if e.is_invalid_input() => return Err(e),
        Err(e) => {
            warn!("Default estimator failed: {}", e);
            None
        }
    };

    Ok(estimate.map(|e| KeyResult {
        tonic: e.tonic,
        scale: e.scale,
        confidence: e.confidence,
        method: estimator.name().to_string(),
        camelot: notation::to_camelot(e.tonic, e.scale),
        open_key: notation::to_open_key(e.tonic, e.scale),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeymatchError;
    use crate::types::{KeyEstimate, PitchClass, Scale};

    struct FixedEstimator {
        name: &'static str,
        estimate: Option<KeyEstimate>,
    }

    impl KeyEstimator for FixedEstimator {
        fn estimate(
            &self,
            _buffer: &AudioBuffer,
            _audio_type: AudioType,
        ) -> Result<Option<KeyEstimate>> {
            Ok(self.estimate)
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct FailingEstimator;

    impl KeyEstimator for FailingEstimator {
        fn estimate(
            &self,
            _buffer: &AudioBuffer,
            _audio_type: AudioType,
        ) -> Result<Option<KeyEstimate>> {
            Err(KeymatchError::estimator("broken", "synthetic failure"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn fixed(name: &'static str, tonic: PitchClass, scale: Scale, conf: f64) -> Box<dyn KeyEstimator> {
        Box::new(FixedEstimator {
            name,
            estimate: Some(KeyEstimate {
                tonic,
                scale,
                confidence: conf,
            }),
        })
    }

    fn buffer() -> AudioBuffer {
        AudioBuffer::new(vec![0.1; 22050], 22050)
    }

    #[test]
    fn failing_estimator_costs_only_its_vote() {
        let ensemble = Ensemble::from_parts(
            vec![
                fixed("profile", PitchClass::G, Scale::Major, 0.6),
                Box::new(FailingEstimator),
            ],
            EstimatorWeights::default(),
            ConsensusTuning::default(),
        );

        let result = ensemble.detect(&buffer(), AudioType::General).unwrap();
        assert_eq!(result.tonic, PitchClass::G);
    }

    #[test]
    fn all_estimators_failing_is_no_candidates() {
        let ensemble = Ensemble::from_parts(
            vec![Box::new(FailingEstimator)],
            EstimatorWeights::default(),
            ConsensusTuning::default(),
        );

        let err = ensemble.detect(&buffer(), AudioType::Beat).unwrap_err();
        assert!(matches!(err, KeymatchError::NoCandidates));
    }

    #[test]
    fn external_is_skipped_for_vocals() {
        // An "external" vote that would dominate must not be consulted
        // on vocals material.
        let ensemble = Ensemble::from_parts(
            vec![
                fixed("external", PitchClass::C, Scale::Major, 5.0),
                fixed("vocal-f0", PitchClass::A, Scale::Minor, 0.4),
            ],
            EstimatorWeights::default(),
            ConsensusTuning::default(),
        );

        let vocals = ensemble.detect(&buffer(), AudioType::Vocals).unwrap();
        assert_eq!(vocals.tonic, PitchClass::A);

        let beat = ensemble.detect(&buffer(), AudioType::Beat).unwrap();
        assert_eq!(beat.tonic, PitchClass::C);
    }

    #[test]
    fn specialized_method_gets_higher_weight_on_its_material() {
        let weights = EstimatorWeights::default();
        assert!(
            weights.for_method("vocal-f0", AudioType::Vocals)
                > weights.for_method("vocal-f0", AudioType::Beat)
        );
        assert!(
            weights.for_method("harmonic", AudioType::Beat)
                > weights.for_method("harmonic", AudioType::Vocals)
        );
    }

    #[test]
    fn default_fallback_reports_profile_method() {
        let samples: Vec<f32> = (0..22050 * 3)
            .map(|i| {
                let t = i as f32 / 22050.0;
                ((2.0 * std::f32::consts::PI * 220.0 * t).sin()
                    + (2.0 * std::f32::consts::PI * 261.63 * t).sin()
                    + (2.0 * std::f32::consts::PI * 329.63 * t).sin())
                    * 0.25
            })
            .collect();
        let buffer = AudioBuffer::new(samples, 22050);

        let result = run_default(&buffer, AudioType::General).unwrap().unwrap();
        assert_eq!(result.method, "profile");
        assert_eq!(result.tonic, PitchClass::A);
    }
}
