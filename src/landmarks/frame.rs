//! # Frame Normalization
//!
//! Converts one raw detection result into a frame that matches the reference schema
//! row for row. Detections are grouped by category and may be missing entirely (no
//! hand in view, face turned away), so the normalizer performs an explicit left join:
//! the schema decides how many rows come out and in what order, detections only
//! decide which of those rows carry coordinates.
//!
//! ## Wire Format (MediaPipe Holistic results):
//! ```json
//! {
//!   "faceLandmarks": [{"x": 0.5, "y": 0.4, "z": -0.01}, ...],
//!   "poseLandmarks": null,
//!   "leftHandLandmarks": [...],
//!   "rightHandLandmarks": null
//! }
//! ```

use crate::error::PipelineError;
use crate::landmarks::schema::{LandmarkGroup, ReferenceSchema};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{trace, warn};

/// Upper bound on points accepted for a single group in one frame.
/// Anything larger is a malformed payload, not a detection.
const MAX_POINTS_PER_GROUP: usize = 4096;

/// One detected 3-D keypoint.
///
/// Coordinates that are absent or `null` on the wire deserialize as NaN, which is
/// the same missing marker the normalizer uses for undetected landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    #[serde(default = "missing_coordinate", deserialize_with = "nullable_coordinate")]
    pub x: f64,
    #[serde(default = "missing_coordinate", deserialize_with = "nullable_coordinate")]
    pub y: f64,
    #[serde(default = "missing_coordinate", deserialize_with = "nullable_coordinate")]
    pub z: f64,
}

impl LandmarkPoint {
    #[cfg(test)]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

fn missing_coordinate() -> f64 {
    f64::NAN
}

fn nullable_coordinate<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Per-frame detections grouped by landmark category.
///
/// Each group is `None` when the detector reported nothing for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrameDetections {
    #[serde(default, rename = "faceLandmarks", alias = "face")]
    pub face: Option<Vec<LandmarkPoint>>,

    #[serde(default, rename = "poseLandmarks", alias = "pose")]
    pub pose: Option<Vec<LandmarkPoint>>,

    #[serde(default, rename = "leftHandLandmarks", alias = "left_hand")]
    pub left_hand: Option<Vec<LandmarkPoint>>,

    #[serde(default, rename = "rightHandLandmarks", alias = "right_hand")]
    pub right_hand: Option<Vec<LandmarkPoint>>,
}

impl RawFrameDetections {
    /// Points reported for `group`, if any.
    pub fn group(&self, group: LandmarkGroup) -> Option<&[LandmarkPoint]> {
        let points = match group {
            LandmarkGroup::Face => &self.face,
            LandmarkGroup::LeftHand => &self.left_hand,
            LandmarkGroup::Pose => &self.pose,
            LandmarkGroup::RightHand => &self.right_hand,
        };
        points.as_deref()
    }

    /// Builder-style setter for a single group.
    #[cfg(test)]
    pub fn with_group(mut self, group: LandmarkGroup, points: Vec<LandmarkPoint>) -> Self {
        let slot = match group {
            LandmarkGroup::Face => &mut self.face,
            LandmarkGroup::LeftHand => &mut self.left_hand,
            LandmarkGroup::Pose => &mut self.pose,
            LandmarkGroup::RightHand => &mut self.right_hand,
        };
        *slot = Some(points);
        self
    }

    /// True when no group was reported at all.
    pub fn is_empty(&self) -> bool {
        LandmarkGroup::ALL.iter().all(|&group| self.group(group).is_none())
    }
}

/// One schema slot of a normalized frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRow {
    pub group: LandmarkGroup,
    pub landmark_index: usize,
    /// `None` when the landmark was not detected in this frame
    pub point: Option<LandmarkPoint>,
    pub frame_number: u64,
}

impl NormalizedRow {
    /// Coordinates as 32-bit floats, NaN for a missing landmark.
    pub fn xyz(&self) -> [f32; 3] {
        match self.point {
            Some(point) => [point.x as f32, point.y as f32, point.z as f32],
            None => [f32::NAN; 3],
        }
    }

    pub fn is_missing(&self) -> bool {
        self.point.is_none()
    }
}

/// A frame laid out in schema order. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    frame_number: u64,
    rows: Vec<NormalizedRow>,
}

impl NormalizedFrame {
    /// Zero-row frame returned when normalization fails.
    pub fn empty(frame_number: u64) -> Self {
        Self { frame_number, rows: Vec::new() }
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows that carry detected coordinates.
    pub fn detected_count(&self) -> usize {
        self.rows.iter().filter(|row| !row.is_missing()).count()
    }
}

/// Normalize one frame, never failing.
///
/// Errors are logged and turned into a zero-row frame so that a single malformed
/// frame cannot abort the session it belongs to.
pub fn normalize(
    raw: &RawFrameDetections,
    frame_number: u64,
    schema: &ReferenceSchema,
) -> NormalizedFrame {
    match try_normalize(raw, frame_number, schema) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(frame_number, error = %err, "Frame normalization failed");
            NormalizedFrame::empty(frame_number)
        }
    }
}

/// Left-join the detections in `raw` onto `schema`.
///
/// ## Process:
/// 1. Start with one empty slot per schema row
/// 2. For every reported group, place point `i` at the slot for `(group, i)`
/// 3. Points with no matching slot (e.g. refined iris points) are dropped
/// 4. Emit rows in schema order, stamped with `frame_number`
pub fn try_normalize(
    raw: &RawFrameDetections,
    frame_number: u64,
    schema: &ReferenceSchema,
) -> Result<NormalizedFrame, PipelineError> {
    let mut slots: Vec<Option<LandmarkPoint>> = vec![None; schema.rows_per_frame()];

    for group in LandmarkGroup::ALL {
        let Some(points) = raw.group(group) else {
            continue;
        };

        if points.len() > MAX_POINTS_PER_GROUP {
            return Err(PipelineError::Normalization(format!(
                "{} reported {} points (limit {})",
                group,
                points.len(),
                MAX_POINTS_PER_GROUP
            )));
        }

        let mut unmatched = 0usize;
        for (landmark_index, point) in points.iter().enumerate() {
            match schema.position(group, landmark_index) {
                Some(position) => slots[position] = Some(*point),
                None => unmatched += 1,
            }
        }

        if unmatched > 0 {
            trace!(frame_number, %group, unmatched, "Dropped landmarks outside the schema");
        }
    }

    let rows = schema
        .rows()
        .iter()
        .zip(slots)
        .map(|(row, point)| NormalizedRow {
            group: row.group,
            landmark_index: row.landmark_index,
            point,
            frame_number,
        })
        .collect();

    Ok(NormalizedFrame { frame_number, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::schema::ROWS_PER_FRAME;

    fn points(count: usize, offset: f64) -> Vec<LandmarkPoint> {
        (0..count)
            .map(|i| LandmarkPoint::new(offset + i as f64, offset + i as f64 + 0.5, -(i as f64)))
            .collect()
    }

    #[test]
    fn test_empty_detections_keep_schema_shape() {
        let schema = ReferenceSchema::holistic();
        let frame = normalize(&RawFrameDetections::default(), 7, &schema);

        assert_eq!(frame.len(), ROWS_PER_FRAME);
        assert_eq!(frame.detected_count(), 0);
        for (row, reference) in frame.rows().iter().zip(schema.rows()) {
            assert_eq!(row.group, reference.group);
            assert_eq!(row.landmark_index, reference.landmark_index);
            assert_eq!(row.frame_number, 7);
            assert!(row.xyz().iter().all(|v| v.is_nan()));
        }
    }

    #[test]
    fn test_left_hand_only_fills_missing_elsewhere() {
        let schema = ReferenceSchema::holistic();
        let hand = points(21, 0.1);
        let raw = RawFrameDetections::default().with_group(LandmarkGroup::LeftHand, hand.clone());

        let frame = normalize(&raw, 1, &schema);
        assert_eq!(frame.len(), ROWS_PER_FRAME);
        assert_eq!(frame.detected_count(), 21);

        for row in frame.rows() {
            if row.group == LandmarkGroup::LeftHand {
                assert_eq!(row.point, Some(hand[row.landmark_index]));
            } else {
                assert!(row.is_missing());
            }
        }
    }

    #[test]
    fn test_points_outside_schema_are_dropped() {
        let schema = ReferenceSchema::holistic();
        // Refined face mesh reports 478 points; the schema only knows 468.
        let raw = RawFrameDetections::default().with_group(LandmarkGroup::Face, points(478, 0.0));

        let frame = normalize(&raw, 2, &schema);
        assert_eq!(frame.len(), ROWS_PER_FRAME);
        assert_eq!(frame.detected_count(), 468);
    }

    #[test]
    fn test_oversized_group_yields_empty_frame() {
        let schema = ReferenceSchema::holistic();
        let raw = RawFrameDetections::default()
            .with_group(LandmarkGroup::Pose, points(MAX_POINTS_PER_GROUP + 1, 0.0));

        assert!(try_normalize(&raw, 3, &schema).is_err());
        let frame = normalize(&raw, 3, &schema);
        assert!(frame.is_empty());
        assert_eq!(frame.frame_number(), 3);
    }

    #[test]
    fn test_holistic_json_deserialization() {
        let json = r#"{
            "faceLandmarks": null,
            "poseLandmarks": [{"x": 0.25, "y": 0.5, "z": -0.125, "visibility": 0.9}],
            "leftHandLandmarks": [{"x": 0.1, "y": null}]
        }"#;
        let raw: RawFrameDetections = serde_json::from_str(json).unwrap();

        assert!(raw.face.is_none());
        assert!(raw.right_hand.is_none());
        assert!(!raw.is_empty());
        assert_eq!(raw.pose.as_ref().unwrap()[0], LandmarkPoint::new(0.25, 0.5, -0.125));

        let hand = raw.left_hand.as_ref().unwrap()[0];
        assert_eq!(hand.x, 0.1);
        assert!(hand.y.is_nan());
        assert!(hand.z.is_nan());
    }

    #[test]
    fn test_is_empty() {
        assert!(RawFrameDetections::default().is_empty());
        let raw: RawFrameDetections = serde_json::from_str("{}").unwrap();
        assert!(raw.is_empty());
        let raw = RawFrameDetections::default().with_group(LandmarkGroup::RightHand, Vec::new());
        assert!(!raw.is_empty());
    }
}
