//! # Inference Engine
//!
//! Wraps the pre-trained sign classifier behind a small capability interface:
//! `predict(tensor) -> scores`, one score per vocabulary ordinal.
//!
//! ## Key Responsibilities:
//! - **Model loading**: The ONNX model is loaded exactly once at startup; failure is fatal
//! - **Serialized access**: One inference call runs at a time, so a score vector can never
//!   mix two sessions' inputs
//! - **Performance monitoring**: Request counts, failures and latency
//!
//! ## Thread Safety:
//! The backend lives behind a `Mutex`. ONNX Runtime sessions need `&mut self` to run,
//! and inference is CPU-bound, so callers queue on the lock instead of racing.

use crate::error::PipelineError;
use crate::inference::tensor::{InputTensor, COORDINATES};
use anyhow::{anyhow, Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// Anything that can turn an input tensor into a score vector.
pub trait InferenceBackend: Send {
    /// Short name used in logs and health output.
    fn name(&self) -> &str;

    /// Run the model on `tensor` and return one score per ordinal.
    fn predict(&mut self, tensor: &InputTensor) -> Result<Vec<f32>>;
}

/// ONNX Runtime backend for the exported sign classifier.
///
/// ## Model Signature:
/// - input `inputs`: float32 `(num_frames, rows_per_frame, 3)`
/// - output `outputs`: float32 `(num_signs,)`
pub struct OnnxBackend {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OnnxBackend {
    /// Load the model file and build an inference session.
    ///
    /// Fails if the named input declares a fixed row or coordinate dimension that
    /// disagrees with `rows_per_frame` and `(x, y, z)`.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        input_name: &str,
        output_name: &str,
        rows_per_frame: usize,
        intra_threads: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        tracing::info!("Loading sign model from {}", model_path.display());
        let start_time = Instant::now();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;

        let input = session
            .inputs
            .iter()
            .find(|input| input.name == input_name)
            .ok_or_else(|| anyhow!("Model has no input named '{}'", input_name))?;
        if let ValueType::Tensor { shape, .. } = &input.input_type {
            let dims: Vec<i64> = shape.iter().copied().collect();
            check_input_shape(&dims, rows_per_frame)
                .with_context(|| format!("Model input '{}' does not match the schema", input_name))?;
        }
        if !session.outputs.iter().any(|output| output.name == output_name) {
            return Err(anyhow!("Model has no output named '{}'", output_name));
        }

        tracing::info!(
            "Sign model loaded in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            session,
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
        })
    }
}

/// Check a declared input shape against `(frames, rows_per_frame, 3)`.
///
/// Negative dimensions are symbolic and accepted.
fn check_input_shape(dims: &[i64], rows_per_frame: usize) -> Result<()> {
    if dims.len() != 3 {
        return Err(anyhow!("expected a rank-3 input, model declares {:?}", dims));
    }
    if dims[1] >= 0 && dims[1] as usize != rows_per_frame {
        return Err(anyhow!(
            "model expects {} rows per frame, schema has {}",
            dims[1],
            rows_per_frame
        ));
    }
    if dims[2] >= 0 && dims[2] as usize != COORDINATES {
        return Err(anyhow!(
            "model expects {} coordinates per row, frames carry {}",
            dims[2],
            COORDINATES
        ));
    }
    Ok(())
}

impl InferenceBackend for OnnxBackend {
    fn name(&self) -> &str {
        "onnx"
    }

    fn predict(&mut self, tensor: &InputTensor) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(tensor.to_array())?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let scores: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        Ok(scores.iter().copied().collect())
    }
}

/// Performance tracking for the engine.
#[derive(Debug, Default)]
struct EngineMetrics {
    total_requests: u64,
    failed_requests: u64,
    total_frames: u64,
    total_processing_time_ms: u64,
}

/// Single shared model instance serving every session.
pub struct InferenceEngine {
    backend: Mutex<Box<dyn InferenceBackend>>,
    backend_name: String,
    metrics: Mutex<EngineMetrics>,
}

impl InferenceEngine {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        let backend_name = backend.name().to_string();
        Self {
            backend: Mutex::new(backend),
            backend_name,
            metrics: Mutex::new(EngineMetrics::default()),
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Run one inference call inside the engine's critical section.
    ///
    /// Blocks the calling thread while another call is in flight; call it from a
    /// blocking-friendly context (`web::block`, `spawn_blocking`).
    pub fn predict(&self, tensor: &InputTensor) -> Result<Vec<f32>, PipelineError> {
        let start_time = Instant::now();

        let result = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| PipelineError::Inference("inference engine lock poisoned".to_string()))?;
            backend.predict(tensor)
        };

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.total_requests += 1;
            metrics.total_frames += tensor.num_frames() as u64;
            metrics.total_processing_time_ms += elapsed_ms;
            if result.is_err() {
                metrics.failed_requests += 1;
            }
        }

        match result {
            Ok(scores) => {
                tracing::debug!(
                    shape = ?tensor.shape(),
                    scores = scores.len(),
                    duration_ms = elapsed_ms,
                    "Inference completed"
                );
                Ok(scores)
            }
            Err(err) => {
                tracing::error!(frames = tensor.num_frames(), error = %err, "Inference failed");
                Err(PipelineError::Inference(format!("{:#}", err)))
            }
        }
    }

    pub fn performance_stats(&self) -> EnginePerformanceStats {
        let Ok(metrics) = self.metrics.lock() else {
            return EnginePerformanceStats::default();
        };

        EnginePerformanceStats {
            total_requests: metrics.total_requests,
            failed_requests: metrics.failed_requests,
            total_frames: metrics.total_frames,
            average_processing_time_ms: if metrics.total_requests > 0 {
                metrics.total_processing_time_ms / metrics.total_requests
            } else {
                0
            },
        }
    }
}

/// Snapshot of engine statistics for the metrics endpoint.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct EnginePerformanceStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_frames: u64,
    pub average_processing_time_ms: u64,
}

/// Test doubles for the model.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Returns a fixed score vector and records the shape of every tensor it sees.
    pub struct FixedScoresBackend {
        pub scores: Vec<f32>,
        pub seen: Arc<Mutex<Vec<InputTensor>>>,
    }

    impl FixedScoresBackend {
        pub fn new(scores: Vec<f32>) -> (Self, Arc<Mutex<Vec<InputTensor>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (Self { scores, seen: seen.clone() }, seen)
        }
    }

    impl InferenceBackend for FixedScoresBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        fn predict(&mut self, tensor: &InputTensor) -> Result<Vec<f32>> {
            self.seen.lock().unwrap().push(tensor.clone());
            Ok(self.scores.clone())
        }
    }

    /// Always fails.
    pub struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        fn predict(&mut self, _tensor: &InputTensor) -> Result<Vec<f32>> {
            Err(anyhow!("model exploded"))
        }
    }
}
