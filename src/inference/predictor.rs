//! # Sign Predictor
//!
//! The assembled pipeline: frames → tensor → model → ranked signs. Owns the three
//! process-wide, read-only resources (schema, vocabulary, model) and is shared by every
//! session through an `Arc`.
//!
//! ## Startup:
//! `SignPredictor::load` fails fast if any resource is missing or inconsistent, so a
//! running server never discovers a broken model mid-session.

use crate::config::ModelsConfig;
use crate::error::PipelineError;
use crate::inference::engine::{InferenceBackend, InferenceEngine, OnnxBackend};
use crate::inference::ranker::{rank, PredictionOutcome};
use crate::inference::tensor::assemble;
use crate::inference::vocabulary::SignVocabulary;
use crate::landmarks::buffer::SessionBuffer;
use crate::landmarks::frame::{NormalizedFrame, RawFrameDetections};
use crate::landmarks::schema::ReferenceSchema;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct SignPredictor {
    schema: Arc<ReferenceSchema>,
    vocabulary: Arc<SignVocabulary>,
    engine: InferenceEngine,
}

impl SignPredictor {
    pub fn new(
        schema: Arc<ReferenceSchema>,
        vocabulary: Arc<SignVocabulary>,
        backend: Box<dyn InferenceBackend>,
    ) -> Self {
        Self {
            schema,
            vocabulary,
            engine: InferenceEngine::new(backend),
        }
    }

    /// Load schema, vocabulary and model as described by `config`.
    ///
    /// ## Errors (all startup-fatal):
    /// - Schema file unreadable or invalid
    /// - Schema row count differs from `rows_per_frame`
    /// - Vocabulary unreadable, invalid or empty
    /// - Model file unreadable or missing the configured input/output
    /// - Model input declares a row or coordinate count the schema cannot fill
    pub fn load(config: &ModelsConfig) -> Result<Self> {
        let schema = match &config.schema_path {
            Some(path) => ReferenceSchema::load(path)?,
            None => ReferenceSchema::holistic(),
        };
        schema.ensure_rows_per_frame(config.rows_per_frame)?;

        let vocabulary = SignVocabulary::load(&config.vocab_map_path)?;
        if vocabulary.max_ordinal().map(|max| max + 1) != Some(vocabulary.len()) {
            warn!("Vocabulary ordinals are not contiguous; gaps will be skipped when ranking");
        }
        let backend = OnnxBackend::load(
            &config.model_path,
            &config.input_name,
            &config.output_name,
            schema.rows_per_frame(),
            config.intra_threads,
        )?;

        Ok(Self::new(Arc::new(schema), Arc::new(vocabulary), Box::new(backend)))
    }

    pub fn schema(&self) -> &Arc<ReferenceSchema> {
        &self.schema
    }

    pub fn vocabulary(&self) -> &SignVocabulary {
        &self.vocabulary
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    /// Run the pipeline on frames already buffered by a session.
    ///
    /// An empty frame list is the `NoFrames` outcome, not an error.
    pub fn predict_frames(
        &self,
        frames: &[NormalizedFrame],
        top_k: usize,
    ) -> Result<PredictionOutcome, PipelineError> {
        let start_time = Instant::now();

        let tensor = match assemble(frames, self.schema.rows_per_frame()) {
            Ok(tensor) => tensor,
            Err(PipelineError::EmptyInput) => return Ok(PredictionOutcome::NoFrames),
            Err(err) => return Err(err),
        };

        info!(frames = tensor.num_frames(), "Predicting sign...");
        let scores = self.engine.predict(&tensor)?;
        if scores.is_empty() {
            return Err(PipelineError::Inference("model returned no scores".to_string()));
        }

        if scores.len() != self.vocabulary.len() {
            warn!(
                scores = scores.len(),
                signs = self.vocabulary.len(),
                "Model output size differs from vocabulary size"
            );
        }

        let outcome = rank(&scores, &self.vocabulary, top_k);
        if outcome.candidates().is_empty() {
            info!(status = outcome.status(), "Prediction produced no candidates");
        }
        for candidate in outcome.candidates() {
            info!(
                "Prediction result: {}, {:.2}%",
                candidate.sign,
                candidate.confidence * 100.0
            );
        }

        tracing::debug!(
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Prediction cycle finished"
        );
        Ok(outcome)
    }

    /// Stateless variant: a whole recording in one call.
    ///
    /// Frames are numbered 1..n in the order given and aggregated through a one-shot
    /// session buffer, so they follow exactly the same normalization rules as a
    /// streaming session.
    pub fn predict_batch(
        &self,
        detections: &[Option<RawFrameDetections>],
        top_k: usize,
    ) -> Result<PredictionOutcome, PipelineError> {
        let mut buffer = SessionBuffer::new(self.schema.clone());
        for raw in detections {
            buffer.on_frame(raw.as_ref());
        }
        self.predict_frames(buffer.on_predict(), top_k)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::inference::engine::testing::FixedScoresBackend;
    use crate::inference::tensor::InputTensor;
    use std::sync::Mutex;

    pub fn vocabulary() -> SignVocabulary {
        ["TV", "after", "airplane", "all", "alligator"]
            .iter()
            .enumerate()
            .map(|(i, sign)| (i, sign.to_string()))
            .collect()
    }

    /// Predictor over the holistic schema with a fixed-score model.
    pub fn predictor(scores: Vec<f32>) -> (SignPredictor, Arc<Mutex<Vec<InputTensor>>>) {
        let (backend, seen) = FixedScoresBackend::new(scores);
        let predictor = SignPredictor::new(
            Arc::new(ReferenceSchema::holistic()),
            Arc::new(vocabulary()),
            Box::new(backend),
        );
        (predictor, seen)
    }
}
