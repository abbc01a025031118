//! keymatch - Musical key compatibility scoring for karaoke recordings
//!
//! Estimates the musical key of a karaoke vocal take and of its backing
//! track, then scores how well the two keys fit together. Key estimation
//! runs a small ensemble of independent heuristic estimators whose votes
//! are resolved by a weighted consensus engine; vocal separation and
//! beat-key estimation run concurrently on a two-worker pipeline.
//!
//! # Architecture
//!
//! - `config`: CLI argument parsing and runtime settings
//! - `audio`: Audio decoding (symphonia), slicing, and WAV artifacts
//! - `analysis`: Key estimators, consensus voting, window selection,
//!   vocal separation, and key comparison
//! - `pipeline`: Two-task parallel orchestration with fallback chains
//! - `export`: JSON result report
//!
//! # Example
//!
//! ```no_run
//! use keymatch::{config::Settings, pipeline};
//!
//! let settings = Settings::default();
//! let outcome = pipeline::run(&settings).expect("pipeline error");
//! println!("{:?}", outcome);
//! ```

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod types;

// Re-export key types at crate root
pub use error::{KeymatchError, Result};
pub use types::{AudioBuffer, AudioWindow, Comparison, KeyCandidate, KeyResult, PipelineResult};
