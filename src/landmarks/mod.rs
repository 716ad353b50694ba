//! # Landmark Processing Module
//! 
//! This module turns the per-frame keypoint detections streamed by a client into
//! frames that line up exactly with the layout the sign classifier was trained on.
//! 
//! ## Key Components:
//! - **Reference Schema**: Ordered `(group, landmark_index)` table the model expects per frame
//! - **Frame Normalizer**: Left-joins raw detections onto the schema, filling gaps with missing markers
//! - **Session Buffer**: Per-connection accumulation of normalized frames
//! - **Session Manager**: Registry of live sessions keyed by connection id
//! 
//! ## Landmark Groups (MediaPipe Holistic):
//! - **face**: 468 points
//! - **left_hand**: 21 points
//! - **pose**: 33 points
//! - **right_hand**: 21 points

pub mod schema;       // Reference schema and landmark groups
pub mod frame;        // Raw detections and frame normalization
pub mod buffer;       // Per-session frame buffer
pub mod session;      // Session registry (connect/frame/predict/disconnect)

pub use frame::RawFrameDetections;
