//! # Tensor Assembly
//!
//! Stacks the buffered frames of a session into the `(num_frames, rows_per_frame, 3)`
//! float32 array the classifier takes as input.
//!
//! ## Ordering:
//! Frames are laid out frame-major in ascending frame number, rows in schema order.
//! The model was trained on exactly this flattening; any other permutation still has a
//! valid shape and silently produces wrong predictions.

use crate::error::PipelineError;
use crate::landmarks::frame::NormalizedFrame;
use ndarray::Array3;

/// Number of coordinates per landmark (x, y, z).
pub const COORDINATES: usize = 3;

/// Model input of shape `(num_frames, rows_per_frame, 3)`.
///
/// Missing landmarks are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    data: Array3<f32>,
}

impl InputTensor {
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn num_frames(&self) -> usize {
        self.data.dim().0
    }

    #[cfg(test)]
    pub fn rows_per_frame(&self) -> usize {
        self.data.dim().1
    }

    #[cfg(test)]
    pub fn view(&self) -> ndarray::ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn to_array(&self) -> Array3<f32> {
        self.data.clone()
    }
}

/// Build the model input from a session's frames.
///
/// ## Errors:
/// - **EmptyInput**: `frames` is empty; callers report "no prediction", not a failure
/// - **ShapeMismatch**: a frame does not have `rows_per_frame` rows. This means the
///   normalizer produced a malformed frame and is never recovered from here.
pub fn assemble(
    frames: &[NormalizedFrame],
    rows_per_frame: usize,
) -> Result<InputTensor, PipelineError> {
    if frames.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let total_rows: usize = frames.iter().map(NormalizedFrame::len).sum();
    if rows_per_frame == 0
        || total_rows % rows_per_frame != 0
        || frames.iter().any(|frame| frame.len() != rows_per_frame)
    {
        return Err(PipelineError::ShapeMismatch { rows: total_rows, rows_per_frame });
    }

    // Stable sort: arrival order is kept for equal frame numbers
    let mut ordered: Vec<&NormalizedFrame> = frames.iter().collect();
    ordered.sort_by_key(|frame| frame.frame_number());

    let mut values = Vec::with_capacity(total_rows * COORDINATES);
    for frame in ordered {
        for row in frame.rows() {
            values.extend_from_slice(&row.xyz());
        }
    }

    let data = Array3::from_shape_vec((frames.len(), rows_per_frame, COORDINATES), values)
        .map_err(|_| PipelineError::ShapeMismatch { rows: total_rows, rows_per_frame })?;

    Ok(InputTensor { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::frame::{normalize, LandmarkPoint, RawFrameDetections};
    use crate::landmarks::schema::{LandmarkGroup, ReferenceSchema, ROWS_PER_FRAME};

    fn frame(schema: &ReferenceSchema, frame_number: u64) -> NormalizedFrame {
        let value = frame_number as f64;
        let raw = RawFrameDetections::default().with_group(
            LandmarkGroup::Pose,
            vec![LandmarkPoint::new(value, value * 10.0, value * 100.0)],
        );
        normalize(&raw, frame_number, schema)
    }

    #[test]
    fn test_empty_input_is_reported() {
        assert_eq!(assemble(&[], ROWS_PER_FRAME), Err(PipelineError::EmptyInput));
    }

    #[test]
    fn test_shape_and_missing_values() {
        let schema = ReferenceSchema::holistic();
        let frames = vec![frame(&schema, 1), frame(&schema, 2)];
        let tensor = assemble(&frames, ROWS_PER_FRAME).unwrap();

        assert_eq!(tensor.shape(), (2, ROWS_PER_FRAME, 3));

        let pose_row = schema.position(LandmarkGroup::Pose, 0).unwrap();
        let view = tensor.view();
        assert_eq!(view[[1, pose_row, 0]], 2.0);
        assert_eq!(view[[1, pose_row, 1]], 20.0);
        assert_eq!(view[[1, pose_row, 2]], 200.0);
        assert!(view[[0, 0, 0]].is_nan());
        assert!(view[[1, ROWS_PER_FRAME - 1, 2]].is_nan());
    }

    #[test]
    fn test_frames_are_ordered_by_frame_number() {
        let schema = ReferenceSchema::holistic();
        let shuffled = vec![frame(&schema, 3), frame(&schema, 1), frame(&schema, 2)];
        let ordered = vec![frame(&schema, 1), frame(&schema, 2), frame(&schema, 3)];

        let pose_row = schema.position(LandmarkGroup::Pose, 0).unwrap();
        let tensor = assemble(&shuffled, ROWS_PER_FRAME).unwrap();
        let firsts: Vec<f32> = (0..3).map(|i| tensor.view()[[i, pose_row, 0]]).collect();
        assert_eq!(firsts, vec![1.0, 2.0, 3.0]);

        // Bitwise identical to assembling in arrival order (NaN != NaN, so compare bits)
        let expected = assemble(&ordered, ROWS_PER_FRAME).unwrap();
        let bits = |t: &InputTensor| t.view().iter().map(|v| v.to_bits()).collect::<Vec<u32>>();
        assert_eq!(bits(&tensor), bits(&expected));
    }

    #[test]
    fn test_malformed_frame_is_shape_error() {
        let schema = ReferenceSchema::holistic();
        let frames = vec![frame(&schema, 1), NormalizedFrame::empty(2)];
        assert_eq!(
            assemble(&frames, ROWS_PER_FRAME),
            Err(PipelineError::ShapeMismatch { rows: ROWS_PER_FRAME, rows_per_frame: ROWS_PER_FRAME })
        );

        let frames = vec![frame(&schema, 1)];
        assert!(matches!(
            assemble(&frames, 542),
            Err(PipelineError::ShapeMismatch { .. })
        ));
    }
}
