//! # Session Frame Buffer
//!
//! Accumulates normalized frames for one connection between predict cycles.
//!
//! ## Key Properties:
//! - **Monotonic frame numbers**: the counter survives resets, so frame numbers stay
//!   unique for the whole life of a connection
//! - **Schema-shaped frames only**: zero-row frames from a failed normalization are
//!   logged and never buffered
//! - **Unbounded**: nothing here caps growth; a client that streams frames and never
//!   predicts keeps them until it disconnects

use crate::landmarks::frame::{normalize, NormalizedFrame, RawFrameDetections};
use crate::landmarks::schema::ReferenceSchema;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-connection accumulation state.
pub struct SessionBuffer {
    /// Schema shared with every other session
    schema: Arc<ReferenceSchema>,

    /// Number of frame events processed so far (never reset)
    frame_counter: u64,

    /// Frames waiting for the next predict call, in arrival order
    buffered_frames: Vec<NormalizedFrame>,
}

impl SessionBuffer {
    pub fn new(schema: Arc<ReferenceSchema>) -> Self {
        Self {
            schema,
            frame_counter: 0,
            buffered_frames: Vec::new(),
        }
    }

    /// Handle one incoming frame.
    ///
    /// ## Returns:
    /// - **Some(frame_number)**: the frame was numbered (and buffered unless its
    ///   normalization failed)
    /// - **None**: the payload was null or reported no landmark group at all
    pub fn on_frame(&mut self, raw: Option<&RawFrameDetections>) -> Option<u64> {
        let raw = match raw {
            Some(raw) if !raw.is_empty() => raw,
            _ => return None,
        };

        self.frame_counter += 1;
        let frame_number = self.frame_counter;
        let frame = normalize(raw, frame_number, &self.schema);

        if frame.len() != self.schema.rows_per_frame() {
            warn!(frame_number, rows = frame.len(), "Skipping frame that failed normalization");
            return Some(frame_number);
        }

        debug!(frame_number, detected = frame.detected_count(), "Buffered landmark frame");
        self.buffered_frames.push(frame);
        Some(frame_number)
    }

    /// All frames buffered since the last reset (may be empty).
    pub fn on_predict(&self) -> &[NormalizedFrame] {
        &self.buffered_frames
    }

    /// Drop every buffered frame. The frame counter is left untouched.
    pub fn reset(&mut self) {
        self.buffered_frames.clear();
    }

    /// Drop buffered frames numbered up to and including `frame_number`.
    ///
    /// Used after a prediction so frames that arrived while inference was running
    /// stay queued for the next cycle.
    pub fn reset_through(&mut self, frame_number: u64) {
        self.buffered_frames.retain(|frame| frame.frame_number() > frame_number);
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn len(&self) -> usize {
        self.buffered_frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffered_frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::frame::LandmarkPoint;
    use crate::landmarks::schema::LandmarkGroup;

    fn pose_frame() -> RawFrameDetections {
        RawFrameDetections::default().with_group(
            LandmarkGroup::Pose,
            vec![LandmarkPoint::new(0.1, 0.2, 0.3)],
        )
    }

    fn buffer() -> SessionBuffer {
        SessionBuffer::new(Arc::new(ReferenceSchema::holistic()))
    }

    #[test]
    fn test_frames_are_numbered_and_buffered() {
        let mut buffer = buffer();
        assert_eq!(buffer.on_frame(Some(&pose_frame())), Some(1));
        assert_eq!(buffer.on_frame(Some(&pose_frame())), Some(2));

        let frames = buffer.on_predict();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_number(), 1);
        assert_eq!(frames[1].frame_number(), 2);
    }

    #[test]
    fn test_empty_payload_is_ignored() {
        let mut buffer = buffer();
        assert_eq!(buffer.on_frame(None), None);
        assert_eq!(buffer.on_frame(Some(&RawFrameDetections::default())), None);
        assert_eq!(buffer.frame_counter(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_reset_keeps_frame_counter() {
        let mut buffer = buffer();
        buffer.on_frame(Some(&pose_frame()));
        buffer.on_frame(Some(&pose_frame()));

        let counter_before = buffer.frame_counter();
        buffer.reset();
        assert!(buffer.on_predict().is_empty());
        assert_eq!(buffer.frame_counter(), counter_before);

        // Numbering continues after the reset
        assert_eq!(buffer.on_frame(Some(&pose_frame())), Some(3));
    }

    #[test]
    fn test_failed_normalization_is_not_buffered() {
        let mut buffer = buffer();
        let oversized = RawFrameDetections::default().with_group(
            LandmarkGroup::Face,
            vec![LandmarkPoint::new(0.0, 0.0, 0.0); 5000],
        );

        assert_eq!(buffer.on_frame(Some(&oversized)), Some(1));
        assert!(buffer.is_empty());
        assert_eq!(buffer.on_frame(Some(&pose_frame())), Some(2));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_reset_through_keeps_later_frames() {
        let mut buffer = buffer();
        for _ in 0..4 {
            buffer.on_frame(Some(&pose_frame()));
        }

        buffer.reset_through(2);
        let numbers: Vec<u64> = buffer.on_predict().iter().map(|f| f.frame_number()).collect();
        assert_eq!(numbers, vec![3, 4]);
    }
}
