//! JSON report writing
//!
//! The report is the machine-readable record of one comparison run.
//! Writes go through a temp file in the same directory plus an atomic
//! rename, so a crash mid-write never leaves a truncated report behind.

use crate::error::{KeymatchError, Result};
use crate::types::{AudioWindow, Comparison, KeyResult, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bumped whenever the report layout changes incompatibly
const SCHEMA_VERSION: u32 = 1;

/// Top-level report document
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportDocument {
    pub schema_version: u32,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureSection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub karaoke_window: AudioWindow,
    pub backing_window: AudioWindow,
    pub beat_key: KeyResult,
    pub vocals_key: KeyResult,
    pub comparison: Comparison,
    pub artifacts: ArtifactSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArtifactSection {
    /// Sliced karaoke window
    pub slice: PathBuf,
    /// Separated vocals
    pub vocals: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailureSection {
    /// Stage tag: "vocal_separation" or "key_detection"
    pub stage: String,
    pub reason: String,
}

impl ReportDocument {
    pub fn from_result(result: &PipelineResult) -> Self {
        let (analysis, failure) = match result {
            PipelineResult::Completed(report) => (
                Some(AnalysisSection {
                    karaoke_window: report.karaoke_window.clone(),
                    backing_window: report.backing_window.clone(),
                    beat_key: report.beat_key.clone(),
                    vocals_key: report.vocals_key.clone(),
                    comparison: report.comparison.clone(),
                    artifacts: ArtifactSection {
                        slice: report.slice_path.clone(),
                        vocals: report.vocals_path.clone(),
                    },
                }),
                None,
            ),
            PipelineResult::Failed { stage, reason } => (
                None,
                Some(FailureSection {
                    stage: stage.tag().to_string(),
                    reason: reason.clone(),
                }),
            ),
        };

        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: chrono::Utc::now(),
            success: result.is_success(),
            analysis,
            failure,
        }
    }
}

/// Serialize a pipeline result to `path` atomically
pub fn write_report(result: &PipelineResult, path: &Path) -> Result<()> {
    let document = ReportDocument::from_result(result);
    let json = serde_json::to_string_pretty(&document).map_err(|e| {
        KeymatchError::OutputError {
            path: path.to_path_buf(),
            reason: format!("Failed to serialize report: {}", e),
        }
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| KeymatchError::output_error(parent, e))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json).map_err(|e| KeymatchError::output_error(&tmp_path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| KeymatchError::output_error(path, e))?;

    debug!("Report written: {} ({} bytes)", path.display(), json.len());
    Ok(())
}
