//! Key analysis: estimator ensemble, consensus voting, window selection,
//! vocal separation, and key comparison
//!
//! The trait seams in `traits` allow swapping estimator and separation
//! backends without touching pipeline code.

pub mod compare;
pub mod consensus;
pub mod estimators;
pub mod notation;
pub mod separation;
pub mod traits;
pub mod window;

pub use estimators::Ensemble;
pub use traits::{KeyEstimator, VocalSeparator};
