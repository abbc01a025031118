//! External key-detection service estimator
//!
//! Wraps an out-of-process detector (typically a containerized tool) as
//! just another ensemble strategy. The window under analysis is written
//! to a temporary WAV, the configured command is invoked with that path,
//! and the first stdout line is parsed as `<tonic> <scale> <strength>`
//! (e.g. `A minor 0.82`).
//!
//! The subprocess gets its own timeout; a hung or failed detector is an
//! ordinary estimator failure that the ensemble absorbs.

use crate::analysis::traits::KeyEstimator;
use crate::audio::write_mono_wav;
use crate::error::{KeymatchError, Result};
use crate::types::{AudioBuffer, AudioType, KeyEstimate, PitchClass, Scale};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct ExternalDetector {
    command: String,
    timeout: Duration,
}

impl ExternalDetector {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Unique scratch path for this invocation
    fn scratch_path() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "keymatch-{}-{}.wav",
            std::process::id(),
            nanos
        ))
    }

    /// Run the detector subprocess against a WAV path, enforcing the
    /// timeout by polling and killing on expiry.
    fn invoke(&self, wav_path: &std::path::Path) -> Result<String> {
        let mut child = Command::new(&self.command)
            .arg(wav_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| KeymatchError::ExternalDetector {
                reason: format!("Failed to spawn '{}': {}", self.command, e),
            })?;

        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        return Err(KeymatchError::ExternalDetector {
                            reason: format!("Detector exited with {}", status),
                        });
                    }
                    break;
                }
                Ok(None) => {
                    if started.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(KeymatchError::ExternalDetector {
                            reason: format!(
                                "Detector timed out after {:.0}s",
                                self.timeout.as_secs_f64()
                            ),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(KeymatchError::ExternalDetector {
                        reason: format!("Failed to poll detector: {}", e),
                    });
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| KeymatchError::ExternalDetector {
                reason: format!("Failed to collect detector output: {}", e),
            })?;

        String::from_utf8(output.stdout).map_err(|_| KeymatchError::ExternalDetector {
            reason: "Detector produced non-UTF-8 output".to_string(),
        })
    }
}

/// Parse a detector output line of the form `<tonic> <scale> <strength>`
pub fn parse_detector_line(line: &str) -> Option<KeyEstimate> {
    let mut parts = line.split_whitespace();
    let tonic = PitchClass::parse(parts.next()?)?;
    let scale = Scale::parse(parts.next()?)?;
    let confidence: f64 = parts.next()?.parse().ok()?;
    if !confidence.is_finite() || confidence < 0.0 {
        return None;
    }
    Some(KeyEstimate {
        tonic,
        scale,
        confidence,
    })
}

impl KeyEstimator for ExternalDetector {
    fn estimate(&self, buffer: &AudioBuffer, _audio_type: AudioType) -> Result<Option<KeyEstimate>> {
        if buffer.is_empty() {
            return Err(KeymatchError::invalid_audio(
                "<buffer>",
                "Zero-length audio buffer",
            ));
        }

        let wav_path = Self::scratch_path();
        write_mono_wav(&wav_path, &buffer.samples, buffer.sample_rate)?;

        let result = self.invoke(&wav_path);
        if let Err(e) = std::fs::remove_file(&wav_path) {
            warn!("Failed to remove scratch WAV {}: {}", wav_path.display(), e);
        }

        let stdout = result?;
        let line = stdout.lines().next().unwrap_or("");
        match parse_detector_line(line) {
            Some(estimate) => {
                debug!(
                    "external detector: {}{} strength {:.2}",
                    estimate.tonic.name(),
                    if estimate.scale == Scale::Minor { "m" } else { "" },
                    estimate.confidence
                );
                Ok(Some(estimate))
            }
            None => Err(KeymatchError::ExternalDetector {
                reason: format!("Unparseable detector output: '{}'", line),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "external"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_line() {
        let estimate = parse_detector_line("A minor 0.82").unwrap();
        assert_eq!(estimate.tonic, PitchClass::A);
        assert_eq!(estimate.scale, Scale::Minor);
        assert!((estimate.confidence - 0.82).abs() < 1e-9);
    }

    #[test]
    fn parses_flat_spelling() {
        let estimate = parse_detector_line("Bb major 0.5").unwrap();
        assert_eq!(estimate.tonic, PitchClass::As);
        assert_eq!(estimate.scale, Scale::Major);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_detector_line("").is_none());
        assert!(parse_detector_line("A").is_none());
        assert!(parse_detector_line("A minor").is_none());
        assert!(parse_detector_line("X minor 0.5").is_none());
        assert!(parse_detector_line("A minor -1.0").is_none());
        assert!(parse_detector_line("A minor NaN").is_none());
    }

    #[test]
    fn missing_command_is_estimator_failure() {
        let detector = ExternalDetector::new(
            "/nonexistent/keymatch-test-detector",
            Duration::from_secs(1),
        );
        let buffer = AudioBuffer::new(vec![0.1; 2205], 22050);
        let err = detector
            .estimate(&buffer, AudioType::Beat)
            .unwrap_err();
        assert!(matches!(err, KeymatchError::ExternalDetector { .. }));
        assert!(!err.is_invalid_input());
    }
}
