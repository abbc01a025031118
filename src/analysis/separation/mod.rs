//! Vocal separation backends
//!
//! Primary: ONNX model inference (requires the `separation` feature and
//! a model file). Fallback: a crude but always-available mid/side
//! center-channel heuristic. The pipeline walks this chain in order and
//! only a fully exhausted chain surfaces as a stage failure.

pub mod midside;
pub mod model;

pub use midside::MidSideSeparator;
pub use model::OnnxVocalSeparator;

use crate::analysis::traits::VocalSeparator;
use std::sync::Arc;

/// The separation fallback chain, primary first
pub fn default_chain() -> Vec<Arc<dyn VocalSeparator>> {
    vec![
        Arc::new(OnnxVocalSeparator::new()),
        Arc::new(MidSideSeparator::default()),
    ]
}
