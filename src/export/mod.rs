//! Report export
//!
//! A pipeline run produces one JSON report next to its audio artifacts.

pub mod json;

pub use json::write_report;
