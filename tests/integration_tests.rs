//! Integration tests for the keymatch pipeline
//!
//! These tests run the full pipeline over synthesized WAV fixtures and
//! verify the comparison outcome and the exported report.

use keymatch::config::Settings;
use keymatch::pipeline;
use keymatch::types::PipelineResult;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Generate a mono WAV holding a sustained chord (all pitches at once)
fn generate_chord_wav(path: &Path, freqs: &[f32], duration_secs: f32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV file");
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let amplitude = 0.5f32 / freqs.len() as f32;

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let sample: f32 = freqs
            .iter()
            .map(|f| (2.0 * PI * f * t).sin() * amplitude)
            .sum();
        writer
            .write_sample((sample * 32767.0) as i16)
            .expect("Failed to write sample");
    }

    writer.finalize().expect("Failed to finalize WAV");
}

/// Generate a stereo WAV with a center-panned melody (identical channels),
/// cycling through the given pitches one second at a time. Stands in for a
/// karaoke take whose vocal sits in the center of the mix.
fn generate_melody_wav(path: &Path, freqs: &[f32], duration_secs: f32, sample_rate: u32) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV file");
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let amplitude = 0.5f32;

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let note = (t as usize) % freqs.len();
        let sample = (2.0 * PI * freqs[note] * t).sin() * amplitude;
        let sample_i16 = (sample * 32767.0) as i16;
        // Same signal in both channels keeps the "vocal" centered
        writer.write_sample(sample_i16).expect("Failed to write sample");
        writer.write_sample(sample_i16).expect("Failed to write sample");
    }

    writer.finalize().expect("Failed to finalize WAV");
}

const A3: f32 = 220.0;
const C4: f32 = 261.63;
const E4: f32 = 329.63;
const GS4: f32 = 415.30;
const B4: f32 = 493.88;

fn settings_for(dir: &TempDir, karaoke: PathBuf, backing: PathBuf) -> Settings {
    Settings {
        karaoke,
        backing,
        output: dir.path().join("out"),
        window_duration: 6.0,
        ..Settings::default()
    }
}

/// Locate the run-scoped artifact directory under the output root
fn find_run_dir(output: &Path) -> PathBuf {
    std::fs::read_dir(output)
        .expect("output directory should exist")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.is_dir())
        .expect("run directory should exist")
}

#[test]
fn matching_keys_score_one_hundred() {
    let dir = TempDir::new().unwrap();
    let karaoke = dir.path().join("take.wav");
    let backing = dir.path().join("backing.wav");

    // A-minor arpeggio over an A-minor chord: same key on both sides
    generate_melody_wav(&karaoke, &[A3, C4, E4], 8.0, 22050);
    generate_chord_wav(&backing, &[A3, C4, E4], 8.0, 22050);

    let settings = settings_for(&dir, karaoke, backing);
    let result = pipeline::run(&settings).expect("pipeline should not error");

    match result {
        PipelineResult::Completed(report) => {
            assert_eq!(report.beat_key.standard_notation(), "Am");
            assert_eq!(report.vocals_key.standard_notation(), "Am");
            assert_eq!(report.beat_key.camelot, "8A");
            assert!(report.comparison.is_match);
            assert_eq!(report.comparison.score, 100.0);
            assert!(report.slice_path.exists(), "sliced window artifact missing");
            assert!(report.vocals_path.exists(), "separated vocals artifact missing");
        }
        PipelineResult::Failed { stage, reason } => {
            panic!("pipeline failed at {}: {}", stage.tag(), reason)
        }
    }
}

#[test]
fn distant_keys_do_not_match() {
    let dir = TempDir::new().unwrap();
    let karaoke = dir.path().join("take.wav");
    let backing = dir.path().join("backing.wav");

    // A-minor vocal over an E-major chord: four steps apart on the wheel
    generate_melody_wav(&karaoke, &[A3, C4, E4], 8.0, 22050);
    generate_chord_wav(&backing, &[E4, GS4, B4], 8.0, 22050);

    let settings = settings_for(&dir, karaoke, backing);
    let result = pipeline::run(&settings).expect("pipeline should not error");

    match result {
        PipelineResult::Completed(report) => {
            assert_eq!(report.vocals_key.standard_notation(), "Am");
            assert!(!report.comparison.is_match);
            assert!(
                report.comparison.score < 50.0,
                "distant keys should score low, got {}",
                report.comparison.score
            );
        }
        PipelineResult::Failed { stage, reason } => {
            panic!("pipeline failed at {}: {}", stage.tag(), reason)
        }
    }
}

#[test]
fn report_json_is_written_with_expected_shape() {
    let dir = TempDir::new().unwrap();
    let karaoke = dir.path().join("take.wav");
    let backing = dir.path().join("backing.wav");

    generate_melody_wav(&karaoke, &[A3, C4, E4], 8.0, 22050);
    generate_chord_wav(&backing, &[A3, C4, E4], 8.0, 22050);

    let settings = settings_for(&dir, karaoke, backing);
    let result = pipeline::run(&settings).expect("pipeline should not error");
    assert!(result.is_success());

    let run_dir = find_run_dir(&settings.output);
    let report_path = run_dir.join("keymatch.json");
    assert!(report_path.exists(), "report JSON missing");

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(parsed["schema_version"], 1);
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["analysis"]["comparison"]["match"], true);
    assert!(parsed["analysis"]["beat_key"]["camelot"].is_string());
    assert!(parsed["analysis"]["vocals_key"]["open_key"].is_string());
    assert!(parsed["analysis"]["artifacts"]["vocals"].is_string());
    assert!(parsed["generated_at"].is_string());
}

#[test]
fn sliced_window_artifact_covers_the_selected_span() {
    let dir = TempDir::new().unwrap();
    let karaoke = dir.path().join("take.wav");
    let backing = dir.path().join("backing.wav");

    // 8s file with a 6s window: the window is centered, starting at 1s
    generate_melody_wav(&karaoke, &[A3, C4, E4], 8.0, 22050);
    generate_chord_wav(&backing, &[A3, C4, E4], 8.0, 22050);

    let settings = settings_for(&dir, karaoke, backing);
    let result = pipeline::run(&settings).expect("pipeline should not error");

    let report = match result {
        PipelineResult::Completed(report) => report,
        PipelineResult::Failed { stage, reason } => {
            panic!("pipeline failed at {}: {}", stage.tag(), reason)
        }
    };

    assert_eq!(report.karaoke_window.start_secs, 1.0);
    assert_eq!(report.karaoke_window.duration_secs, 6.0);

    let reader = hound::WavReader::open(&report.slice_path).unwrap();
    assert_eq!(reader.spec().channels, 2);
    let slice_secs = reader.len() as f64 / (2.0 * reader.spec().sample_rate as f64);
    assert!((slice_secs - 6.0).abs() < 0.05);
}

#[test]
fn missing_input_is_rejected_before_analysis() {
    let dir = TempDir::new().unwrap();
    let backing = dir.path().join("backing.wav");
    generate_chord_wav(&backing, &[A3, C4, E4], 8.0, 22050);

    let settings = settings_for(&dir, dir.path().join("nope.wav"), backing);
    let err = pipeline::run(&settings).unwrap_err();
    assert!(err.is_invalid_input());
}

#[test]
fn too_short_input_is_rejected() {
    let dir = TempDir::new().unwrap();
    let karaoke = dir.path().join("take.wav");
    let backing = dir.path().join("backing.wav");

    generate_melody_wav(&karaoke, &[A3], 1.0, 22050);
    generate_chord_wav(&backing, &[A3, C4, E4], 8.0, 22050);

    let settings = settings_for(&dir, karaoke, backing);
    let err = pipeline::run(&settings).unwrap_err();
    assert!(err.is_invalid_input());
}
