//! Audio decoding and artifact writing

pub mod decoder;
pub mod wav;

pub use decoder::{decode, decode_stereo, ANALYSIS_SAMPLE_RATE};
pub use wav::{write_mono_wav, write_stereo_wav};
