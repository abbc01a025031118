//! ONNX model based vocal separation
//!
//! Runs a 2-stem (vocals / accompaniment) separation model via ONNX
//! Runtime. The model file is located through `KEYMATCH_MODEL_PATH`;
//! without the `separation` feature or the model, the backend reports
//! itself unavailable and the pipeline falls through to the mid/side
//! heuristic.

use crate::analysis::traits::VocalSeparator;
use crate::error::{KeymatchError, Result};
use std::path::{Path, PathBuf};
#[cfg(feature = "separation")]
use std::sync::Mutex;
#[allow(unused_imports)]
use tracing::{debug, info, warn};

#[cfg(feature = "separation")]
use ort::session::Session;

/// Environment variable naming the ONNX model file
pub const MODEL_PATH_ENV: &str = "KEYMATCH_MODEL_PATH";

/// Expected model sample rate (samples are fed as decoded; models in
/// common use are trained at 44.1 kHz)
#[cfg(feature = "separation")]
const CHUNK_SECONDS: f64 = 10.0;

pub struct OnnxVocalSeparator {
    #[allow(dead_code)]
    model_path: Option<PathBuf>,
    #[cfg(feature = "separation")]
    session: Option<Mutex<Session>>,
    #[cfg(not(feature = "separation"))]
    #[allow(dead_code)]
    session: Option<()>,
    available: bool,
}

impl OnnxVocalSeparator {
    #[cfg(feature = "separation")]
    pub fn new() -> Self {
        match Self::initialize() {
            Ok(separator) => separator,
            Err(e) => {
                warn!("ONNX separator initialization failed: {}", e);
                Self {
                    model_path: None,
                    session: None,
                    available: false,
                }
            }
        }
    }

    #[cfg(not(feature = "separation"))]
    pub fn new() -> Self {
        Self {
            model_path: None,
            session: None,
            available: false,
        }
    }

    #[cfg(feature = "separation")]
    fn initialize() -> Result<Self> {
        let model_path = find_model_path()?;

        let session = Session::builder()
            .map_err(|e| KeymatchError::SeparationUnavailable {
                reason: format!("Failed to create session builder: {}", e),
            })?
            .commit_from_file(&model_path)
            .map_err(|e| KeymatchError::SeparationUnavailable {
                reason: format!("Failed to load model: {}", e),
            })?;

        info!("ONNX separator ready, model: {}", model_path.display());

        Ok(Self {
            model_path: Some(model_path),
            session: Some(Mutex::new(session)),
            available: true,
        })
    }

    /// Run chunked inference and return the vocals channel.
    ///
    /// Chunks are processed back to back without overlap; the seam
    /// artifacts are inaudible to chroma analysis, which is all the
    /// output is used for.
    #[cfg(feature = "separation")]
    fn run_inference(&self, stereo: &crate::types::StereoBuffer) -> Result<Vec<f32>> {
        use ndarray::Array3;
        use ort::value::Tensor;

        let session_mutex =
            self.session
                .as_ref()
                .ok_or_else(|| KeymatchError::SeparationUnavailable {
                    reason: "Session not initialized".to_string(),
                })?;
        let mut session = session_mutex
            .lock()
            .map_err(|_| KeymatchError::separation("Failed to acquire session lock"))?;

        let chunk_len = (CHUNK_SECONDS * stereo.sample_rate as f64) as usize;
        let total = stereo.len();
        let mut vocals: Vec<f32> = Vec::with_capacity(total);

        let mut pos = 0;
        while pos < total {
            let end = (pos + chunk_len).min(total);
            let frames = end - pos;

            let mut input = Array3::<f32>::zeros((1, 2, frames));
            input
                .slice_mut(ndarray::s![0, 0, ..])
                .assign(&ndarray::ArrayView1::from(&stereo.left[pos..end]));
            input
                .slice_mut(ndarray::s![0, 1, ..])
                .assign(&ndarray::ArrayView1::from(&stereo.right[pos..end]));

            let tensor = Tensor::from_array(input)
                .map_err(|e| KeymatchError::separation(format!("Input tensor: {}", e)))?;

            let input_name = session
                .inputs
                .first()
                .ok_or_else(|| KeymatchError::separation("Model declares no inputs"))?
                .name
                .clone();

            let outputs = session
                .run(ort::inputs![input_name.as_str() => tensor])
                .map_err(|e| KeymatchError::separation(format!("Inference failed: {}", e)))?;

            let output = outputs
                .iter()
                .next()
                .map(|(_, v)| v)
                .ok_or_else(|| KeymatchError::separation("Model produced no outputs"))?;

            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| KeymatchError::separation(format!("Output tensor: {}", e)))?;

            // Expect (batch=1, stems, channels=2, samples), vocals first
            let dims: Vec<i64> = shape.iter().copied().collect();
            if dims.len() != 4 || dims[2] != 2 {
                return Err(KeymatchError::separation(format!(
                    "Unexpected output shape {:?}",
                    dims
                )));
            }
            let samples = dims[3] as usize;
            let stem_stride = 2 * samples;

            // Downmix the vocals stem to mono
            for i in 0..samples.min(frames) {
                let l = data[i];
                let r = data[stem_stride / 2 + i];
                vocals.push((l + r) * 0.5);
            }

            pos = end;
        }

        Ok(vocals)
    }
}

impl Default for OnnxVocalSeparator {
    fn default() -> Self {
        Self::new()
    }
}

impl VocalSeparator for OnnxVocalSeparator {
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<PathBuf> {
        if !self.available {
            return Err(KeymatchError::SeparationUnavailable {
                reason: format!(
                    "Model not loaded; set {} and build with --features separation",
                    MODEL_PATH_ENV
                ),
            });
        }

        #[cfg(feature = "separation")]
        {
            use crate::audio::{self, write_mono_wav};

            let stereo = audio::decode_stereo(input)?;
            if stereo.is_empty() {
                return Err(KeymatchError::separation("Decoded an empty stereo buffer"));
            }

            debug!(
                "Separating {:.1}s of audio with ONNX model",
                stereo.duration()
            );

            let vocals = self.run_inference(&stereo)?;
            if vocals.is_empty() {
                return Err(KeymatchError::separation("Model returned no samples"));
            }

            std::fs::create_dir_all(output_dir)
                .map_err(|e| KeymatchError::output_error(output_dir, e))?;

            let stem = input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("take");
            let out_path = output_dir.join(format!("{}_vocals.wav", stem));
            write_mono_wav(&out_path, &vocals, stereo.sample_rate)?;
            return Ok(out_path);
        }

        #[cfg(not(feature = "separation"))]
        {
            let _ = (input, output_dir);
            unreachable!("available is never true without the separation feature")
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

/// Locate the separation model file
#[cfg(feature = "separation")]
fn find_model_path() -> Result<PathBuf> {
    let path = std::env::var(MODEL_PATH_ENV).map_err(|_| KeymatchError::SeparationUnavailable {
        reason: format!("{} is not set", MODEL_PATH_ENV),
    })?;
    let path = PathBuf::from(path);
    if !path.exists() {
        return Err(KeymatchError::SeparationUnavailable {
            reason: format!("Model file not found: {}", path.display()),
        });
    }
    Ok(path)
}
