//! # Inference Module
//! 
//! Runs the sign classifier over a session's buffered frames and ranks the result.
//! 
//! ## Key Components:
//! - **Tensor Assembler**: Stacks normalized frames into a `(frames, rows, 3)` float32 array
//! - **Inference Engine**: Serialized access to the single loaded model
//! - **Vocabulary**: Ordinal → sign label lookup
//! - **Ranker**: Top-K selection with NaN handling and deterministic tie-breaks
//! - **Predictor**: The pipeline tying the above together
//! 
//! ## Model Runtime:
//! The classifier is served through ONNX Runtime (`ort`). Models trained and exported
//! as TFLite are converted to ONNX once, offline; the input/output tensor names are
//! configurable.

pub mod tensor;      // Frame stacking into the model input
pub mod engine;      // Model wrapper and backend trait
pub mod vocabulary;  // Ordinal → sign mapping
pub mod ranker;      // Top-K ranking
pub mod predictor;   // End-to-end pipeline

pub use predictor::SignPredictor;
