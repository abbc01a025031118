//! Parallel processing pipeline
//!
//! Drives one comparison run as a small state machine:
//!
//! 1. Select analysis windows and persist the sliced karaoke window.
//! 2. Launch two workers together: Task A estimates the beat key on the
//!    backing track, Task B separates vocals from the karaoke slice.
//! 3. Join Task A first, always. Beat-key detection is the cheaper task
//!    and its result is wanted regardless of how separation goes, so the
//!    pipeline fails fast on it instead of idling behind the separator.
//!    The join order is on the handles, not on completion order.
//! 4. Join Task B, then run vocal-key estimation sequentially on the
//!    separated artifact (it structurally depends on Task B's output).
//! 5. Compare both keys and write the report.
//!
//! Fallbacks live below the orchestrator: estimator failures cost one
//! vote, an empty ensemble retries other audio types and then the
//! default estimator, and separation walks its backend chain. Only an
//! exhausted chain surfaces as `Failed(stage)`; no retries happen here.

use crate::analysis::separation;
use crate::analysis::traits::VocalSeparator;
use crate::analysis::{compare, estimators, window, Ensemble};
use crate::audio;
use crate::config::Settings;
use crate::error::{KeymatchError, Result};
use crate::export;
use crate::types::{
    AudioBuffer, AudioType, FailureStage, KeyResult, PipelineResult, RunReport,
};
use hash32::{FnvHasher, Hasher as _};
use std::hash::Hasher as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Minimum input duration for reliable key analysis
const MIN_AUDIO_DURATION_SECS: f64 = 3.0;

/// Beat-key preprocessing retry chain, in fixed order
const BEAT_KEY_CHAIN: [AudioType; 3] = [AudioType::Beat, AudioType::Instrumental, AudioType::Vocals];

/// Ordered record of orchestration steps, used to verify the join
/// ordering guarantee under races.
#[derive(Debug, Default)]
pub struct RunTrace {
    pub events: Vec<&'static str>,
}

impl RunTrace {
    fn mark(&mut self, event: &'static str) {
        debug!("pipeline: {}", event);
        self.events.push(event);
    }
}

/// Run the full comparison pipeline with default components
pub fn run(settings: &Settings) -> Result<PipelineResult> {
    let ensemble = Arc::new(Ensemble::from_settings(settings));
    let separators = separation::default_chain();
    let mut trace = RunTrace::default();
    let result = execute(settings, ensemble, separators, &mut trace)?;

    let report_path = run_dir(settings).join("keymatch.json");
    export::write_report(&result, &report_path)?;
    info!("Report written to {}", report_path.display());

    Ok(result)
}

/// Run-scoped artifact directory, derived from both input paths so
/// concurrent runs over different inputs never collide.
fn run_dir(settings: &Settings) -> PathBuf {
    settings.output.join(format!(
        "run_{:08x}",
        run_id(&settings.karaoke, &settings.backing)
    ))
}

/// FNV-1a hash over the normalized input paths
fn run_id(karaoke: &Path, backing: &Path) -> u32 {
    let mut hasher = FnvHasher::default();
    for path in [karaoke, backing] {
        let normalized = path.to_string_lossy().replace('\\', "/").to_lowercase();
        hasher.write(normalized.as_bytes());
    }
    hasher.finish32()
}

/// Execute one run with explicit components (the seam the tests use)
pub(crate) fn execute(
    settings: &Settings,
    ensemble: Arc<Ensemble>,
    separators: Vec<Arc<dyn VocalSeparator>>,
    trace: &mut RunTrace,
) -> Result<PipelineResult> {
    // ---- Start -> Windowed ----------------------------------------------
    let karaoke_stereo = audio::decode_stereo(&settings.karaoke)?;
    let backing = audio::decode(&settings.backing)?;

    for (path, duration) in [
        (&settings.karaoke, karaoke_stereo.duration()),
        (&settings.backing, backing.duration),
    ] {
        if duration < MIN_AUDIO_DURATION_SECS {
            return Err(KeymatchError::invalid_audio(
                path.as_path(),
                format!(
                    "Audio too short ({:.1}s); at least {:.0}s is needed for key analysis",
                    duration, MIN_AUDIO_DURATION_SECS
                ),
            ));
        }
    }

    let karaoke_window = window::select_window(
        &settings.karaoke,
        karaoke_stereo.duration(),
        settings.window_duration,
    );
    let backing_window =
        window::select_window(&settings.backing, backing.duration, settings.window_duration);

    let run_dir = run_dir(settings);
    std::fs::create_dir_all(&run_dir).map_err(|e| KeymatchError::output_error(&run_dir, e))?;

    // Persist the sliced karaoke window; Task B consumes it as a file and
    // the filename keeps the span traceable.
    let karaoke_slice = karaoke_stereo.slice_window(&karaoke_window);
    let slice_path = run_dir.join(format!(
        "slice_{:.0}s-{:.0}s.wav",
        karaoke_window.start_secs,
        karaoke_window.end_secs()
    ));
    audio::write_stereo_wav(
        &slice_path,
        &karaoke_slice.left,
        &karaoke_slice.right,
        karaoke_slice.sample_rate,
    )?;

    let backing_slice = backing.slice_window(&backing_window);
    trace.mark("windowed");

    // ---- Windowed: launch both tasks together ---------------------------
    let beat_ensemble = Arc::clone(&ensemble);
    let task_a = thread::spawn(move || detect_beat_key(&beat_ensemble, &backing_slice));

    // The separation worker reports through a channel, like a stem worker:
    // its result waits in the buffer however early it finishes.
    let (sep_tx, sep_rx) = crossbeam_channel::bounded::<Result<PathBuf>>(1);
    let sep_input = slice_path.clone();
    let sep_dir = run_dir.clone();
    let task_b = thread::spawn(move || {
        let outcome = separate_with_chain(&separators, &sep_input, &sep_dir);
        // A dropped receiver means the run already aborted
        let _ = sep_tx.send(outcome);
    });

    // ---- Join Task A first, regardless of completion order --------------
    let beat_result = join_worker(task_a, "beat-key");
    trace.mark("beat_key_joined");

    let separation_result = match sep_rx.recv() {
        Ok(outcome) => outcome,
        // Sender dropped without a result: the worker panicked
        Err(_) => Err(KeymatchError::separation(
            "separation worker terminated unexpectedly",
        )),
    };
    let _ = task_b.join();
    trace.mark("separation_joined");

    let beat_key = match beat_result {
        Ok(key) => {
            info!(
                "Beat key: {} ({}, confidence {:.2}, via {})",
                key.standard_notation(),
                key.camelot,
                key.confidence,
                key.method
            );
            key
        }
        Err(e) if e.is_invalid_input() => return Err(e),
        Err(e) => {
            return Ok(PipelineResult::Failed {
                stage: FailureStage::KeyDetection,
                reason: format!("Beat-key detection exhausted all fallbacks: {}", e),
            });
        }
    };

    let vocals_path = match separation_result {
        Ok(path) => path,
        Err(e) if e.is_invalid_input() => return Err(e),
        Err(e) => {
            return Ok(PipelineResult::Failed {
                stage: FailureStage::VocalSeparation,
                reason: e.to_string(),
            });
        }
    };

    // ---- Sequential: vocal key depends on the separated artifact --------
    let vocals_buffer = audio::decode(&vocals_path)?;
    let vocals_key = match detect_vocals_key(&ensemble, &vocals_buffer) {
        Ok(key) => {
            info!(
                "Vocals key: {} ({}, confidence {:.2}, via {})",
                key.standard_notation(),
                key.camelot,
                key.confidence,
                key.method
            );
            key
        }
        Err(e) if e.is_invalid_input() => return Err(e),
        Err(e) => {
            return Ok(PipelineResult::Failed {
                stage: FailureStage::KeyDetection,
                reason: format!("Vocal-key detection exhausted all fallbacks: {}", e),
            });
        }
    };
    trace.mark("vocal_key_done");

    let comparison = compare::compare(&beat_key, &vocals_key);
    info!(
        "Comparison: match={}, similarity={:.2}, score={:.0}",
        comparison.is_match, comparison.similarity, comparison.score
    );

    Ok(PipelineResult::Completed(RunReport {
        karaoke_window,
        backing_window,
        beat_key,
        vocals_key,
        comparison,
        slice_path,
        vocals_path,
    }))
}

/// Join a worker, folding a panic into an ordinary stage error
fn join_worker<T>(
    handle: thread::JoinHandle<Result<T>>,
    task: &'static str,
) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(KeymatchError::estimator(
                task,
                format!("worker panicked: {}", message),
            ))
        }
    }
}

/// Beat-key estimation with the audio-type retry chain.
///
/// An ambiguous backing track under `beat` preprocessing is retried as
/// `instrumental`, then `vocals`, stopping at the first success; after
/// that the designated default estimator gets one shot outside the
/// ensemble.
fn detect_beat_key(ensemble: &Ensemble, buffer: &AudioBuffer) -> Result<KeyResult> {
    for audio_type in BEAT_KEY_CHAIN {
        match ensemble.detect(buffer, audio_type) {
            Ok(key) => {
                if audio_type != AudioType::Beat {
                    debug!(
                        "Beat key resolved on {} retry",
                        audio_type.name()
                    );
                }
                return Ok(key);
            }
            Err(KeymatchError::NoCandidates) => {
                warn!(
                    "No beat-key candidates under {} preprocessing",
                    audio_type.name()
                );
            }
            Err(e) => return Err(e),
        }
    }

    match estimators::run_default(buffer, AudioType::General)? {
        Some(key) => {
            debug!("Beat key recovered by the default estimator");
            Ok(key)
        }
        None => Err(KeymatchError::NoCandidates),
    }
}

/// Vocal-key estimation: one ensemble pass, then the default estimator
fn detect_vocals_key(ensemble: &Ensemble, buffer: &AudioBuffer) -> Result<KeyResult> {
    match ensemble.detect(buffer, AudioType::Vocals) {
        Ok(key) => Ok(key),
        Err(KeymatchError::NoCandidates) => {
            warn!("No vocal-key candidates from the ensemble, trying the default estimator");
            match estimators::run_default(buffer, AudioType::Vocals)? {
                Some(key) => Ok(key),
                None => Err(KeymatchError::NoCandidates),
            }
        }
        Err(e) => Err(e),
    }
}

/// Walk the separation fallback chain in order
fn separate_with_chain(
    separators: &[Arc<dyn VocalSeparator>],
    input: &Path,
    output_dir: &Path,
) -> Result<PathBuf> {
    let mut last_error: Option<KeymatchError> = None;

    for separator in separators {
        if !separator.is_available() {
            debug!("Separator {} unavailable, skipping", separator.name());
            continue;
        }

        match separator.separate(input, output_dir) {
            Ok(path) => {
                info!("Vocals separated by {} -> {}", separator.name(), path.display());
                return Ok(path);
            }
            Err(e) if e.is_invalid_input() => return Err(e),
            Err(e) => {
                warn!("Separator {} failed: {}", separator.name(), e);
                last_error = Some(e);
            }
        }
    }

    Err(KeymatchError::SeparationFailed {
        reason: match last_error {
            Some(e) => format!("all backends exhausted; last error: {}", e),
            None => "no separation backend available".to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::traits::KeyEstimator;
    use crate::config::{ConsensusTuning, EstimatorWeights};
    use crate::types::{KeyEstimate, PitchClass, Scale};
    use std::f32::consts::PI;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Estimator double with a fixed answer and an optional delay
    struct StubEstimator {
        name: &'static str,
        delay: Duration,
        tonic: PitchClass,
        scale: Scale,
    }

    impl KeyEstimator for StubEstimator {
        fn estimate(
            &self,
            _buffer: &AudioBuffer,
            _audio_type: AudioType,
        ) -> Result<Option<KeyEstimate>> {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            Ok(Some(KeyEstimate {
                tonic: self.tonic,
                scale: self.scale,
                confidence: 0.8,
            }))
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Estimator double whose answer depends on the preprocessing type
    struct ScriptedEstimator {
        name: &'static str,
        beat: Option<(PitchClass, Scale)>,
        instrumental: Option<(PitchClass, Scale)>,
        vocals: Option<(PitchClass, Scale)>,
    }

    impl KeyEstimator for ScriptedEstimator {
        fn estimate(
            &self,
            _buffer: &AudioBuffer,
            audio_type: AudioType,
        ) -> Result<Option<KeyEstimate>> {
            let answer = match audio_type {
                AudioType::Beat => self.beat,
                AudioType::Instrumental => self.instrumental,
                AudioType::Vocals => self.vocals,
                AudioType::General => None,
            };
            Ok(answer.map(|(tonic, scale)| KeyEstimate {
                tonic,
                scale,
                confidence: 0.7,
            }))
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    /// Separator double that copies the slice as "vocals" after a delay
    struct StubSeparator {
        delay: Duration,
        fail: bool,
    }

    impl VocalSeparator for StubSeparator {
        fn separate(&self, input: &Path, output_dir: &Path) -> Result<PathBuf> {
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if self.fail {
                return Err(KeymatchError::separation("stub failure"));
            }
            std::fs::create_dir_all(output_dir).unwrap();
            let out = output_dir.join("stub_vocals.wav");
            std::fs::copy(input, &out).unwrap();
            Ok(out)
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    fn write_tone_wav(path: &Path, freq: f32, secs: f32, rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(secs * rate as f32) as usize {
            let t = i as f32 / rate as f32;
            let s = ((2.0 * PI * freq * t).sin() * 12000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(s).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn test_settings(dir: &TempDir) -> Settings {
        let karaoke = dir.path().join("karaoke.wav");
        let backing = dir.path().join("backing.wav");
        write_tone_wav(&karaoke, 440.0, 5.0, 22050, 2);
        write_tone_wav(&backing, 220.0, 5.0, 22050, 1);
        Settings {
            karaoke,
            backing,
            output: dir.path().join("out"),
            window_duration: 4.0,
            ..Settings::default()
        }
    }

    fn stub_ensemble(beat_delay: Duration) -> Arc<Ensemble> {
        Arc::new(Ensemble::from_parts(
            vec![
                Box::new(StubEstimator {
                    name: "profile",
                    delay: beat_delay,
                    tonic: PitchClass::A,
                    scale: Scale::Minor,
                }),
                Box::new(StubEstimator {
                    name: "spectral",
                    delay: Duration::ZERO,
                    tonic: PitchClass::A,
                    scale: Scale::Minor,
                }),
            ],
            EstimatorWeights::default(),
            ConsensusTuning::default(),
        ))
    }

    #[test]
    fn beat_key_is_consumed_before_vocal_processing_even_when_separation_wins_the_race() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        // Separation finishes immediately; beat-key estimation dawdles.
        let ensemble = stub_ensemble(Duration::from_millis(300));
        let separators: Vec<Arc<dyn VocalSeparator>> = vec![Arc::new(StubSeparator {
            delay: Duration::ZERO,
            fail: false,
        })];

        let mut trace = RunTrace::default();
        let result = execute(&settings, ensemble, separators, &mut trace).unwrap();

        assert!(result.is_success());
        let beat_pos = trace
            .events
            .iter()
            .position(|e| *e == "beat_key_joined")
            .unwrap();
        let sep_pos = trace
            .events
            .iter()
            .position(|e| *e == "separation_joined")
            .unwrap();
        let vocal_pos = trace
            .events
            .iter()
            .position(|e| *e == "vocal_key_done")
            .unwrap();
        assert!(beat_pos < sep_pos, "Task A must be consumed before Task B");
        assert!(sep_pos < vocal_pos, "vocal key must wait for separation");
    }

    #[test]
    fn exhausted_separation_chain_fails_with_stage_tag() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        let ensemble = stub_ensemble(Duration::ZERO);
        let separators: Vec<Arc<dyn VocalSeparator>> = vec![
            Arc::new(StubSeparator {
                delay: Duration::ZERO,
                fail: true,
            }),
            Arc::new(StubSeparator {
                delay: Duration::ZERO,
                fail: true,
            }),
        ];

        let mut trace = RunTrace::default();
        let result = execute(&settings, ensemble, separators, &mut trace).unwrap();

        match result {
            PipelineResult::Failed { stage, reason } => {
                assert_eq!(stage, FailureStage::VocalSeparation);
                assert_eq!(stage.tag(), "vocal_separation");
                assert!(reason.contains("exhausted"));
            }
            PipelineResult::Completed(_) => panic!("expected a failed run"),
        }
    }

    #[test]
    fn too_short_input_is_invalid_audio() {
        let dir = TempDir::new().unwrap();
        let karaoke = dir.path().join("short.wav");
        let backing = dir.path().join("backing.wav");
        write_tone_wav(&karaoke, 440.0, 1.0, 22050, 2);
        write_tone_wav(&backing, 220.0, 5.0, 22050, 1);

        let settings = Settings {
            karaoke,
            backing,
            output: dir.path().join("out"),
            window_duration: 4.0,
            ..Settings::default()
        };

        let err = execute(
            &settings,
            stub_ensemble(Duration::ZERO),
            vec![],
            &mut RunTrace::default(),
        )
        .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn ambiguous_beat_material_recovers_on_instrumental_retry() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        // Abstains under beat preprocessing, resolves under instrumental.
        // The vocals answer differs, so a chain that ran one step too far
        // would show up in the beat key.
        let ensemble = Arc::new(Ensemble::from_parts(
            vec![Box::new(ScriptedEstimator {
                name: "profile",
                beat: None,
                instrumental: Some((PitchClass::D, Scale::Major)),
                vocals: Some((PitchClass::C, Scale::Major)),
            })],
            EstimatorWeights::default(),
            ConsensusTuning::default(),
        ));
        let separators: Vec<Arc<dyn VocalSeparator>> = vec![Arc::new(StubSeparator {
            delay: Duration::ZERO,
            fail: false,
        })];

        let result = execute(&settings, ensemble, separators, &mut RunTrace::default()).unwrap();
        match result {
            PipelineResult::Completed(report) => {
                assert_eq!(report.beat_key.tonic, PitchClass::D);
                assert_eq!(report.beat_key.scale, Scale::Major);
                assert_eq!(report.vocals_key.tonic, PitchClass::C);
            }
            PipelineResult::Failed { stage, reason } => {
                panic!("expected recovery via retry, failed at {}: {}", stage.tag(), reason)
            }
        }
    }

    #[test]
    fn fully_abstaining_ensemble_falls_back_to_default_estimator() {
        let dir = TempDir::new().unwrap();
        let settings = test_settings(&dir);

        // Every retry yields no candidates; the designated default
        // estimator then runs outside the ensemble. The fixtures are
        // pure tones (backing 220 Hz, karaoke 440 Hz), so both keys must
        // land on tonic A.
        let ensemble = Arc::new(Ensemble::from_parts(
            vec![Box::new(ScriptedEstimator {
                name: "spectral",
                beat: None,
                instrumental: None,
                vocals: None,
            })],
            EstimatorWeights::default(),
            ConsensusTuning::default(),
        ));
        let separators: Vec<Arc<dyn VocalSeparator>> = vec![Arc::new(StubSeparator {
            delay: Duration::ZERO,
            fail: false,
        })];

        let result = execute(&settings, ensemble, separators, &mut RunTrace::default()).unwrap();
        match result {
            PipelineResult::Completed(report) => {
                assert_eq!(report.beat_key.method, "profile");
                assert_eq!(report.beat_key.tonic, PitchClass::A);
                assert_eq!(report.vocals_key.method, "profile");
                assert_eq!(report.vocals_key.tonic, PitchClass::A);
            }
            PipelineResult::Failed { stage, reason } => {
                panic!("expected the default estimator to recover, failed at {}: {}", stage.tag(), reason)
            }
        }
    }

    #[test]
    fn run_ids_differ_per_input_pair() {
        let a = run_id(Path::new("/music/take1.wav"), Path::new("/music/track.mp3"));
        let b = run_id(Path::new("/music/take2.wav"), Path::new("/music/track.mp3"));
        assert_ne!(a, b);

        // Case and separator normalization keeps IDs stable across platforms
        let c = run_id(Path::new("C:\\Music\\Take1.wav"), Path::new("C:\\Music\\Track.mp3"));
        let d = run_id(Path::new("c:/music/take1.wav"), Path::new("c:/music/track.mp3"));
        assert_eq!(c, d);
    }
}
