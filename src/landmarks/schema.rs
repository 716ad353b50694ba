//! # Reference Schema
//!
//! The sign classifier expects every frame to contain the same landmark slots in the
//! same order. This module owns that ordered table and answers the one question the
//! normalizer needs: "which row does `(group, landmark_index)` belong to?"
//!
//! ## Default Layout (543 rows):
//! `face 0..468`, `left_hand 0..21`, `pose 0..33`, `right_hand 0..21`
//!
//! ## Schema File Format:
//! ```json
//! [{"type": "face", "landmark_index": 0}, {"type": "face", "landmark_index": 1}]
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Number of landmark rows per frame in the reference model.
pub const ROWS_PER_FRAME: usize = 543;

/// Landmark category reported by the upstream holistic detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkGroup {
    Face,
    LeftHand,
    Pose,
    RightHand,
}

impl LandmarkGroup {
    /// Groups in default schema order.
    pub const ALL: [LandmarkGroup; 4] = [
        LandmarkGroup::Face,
        LandmarkGroup::LeftHand,
        LandmarkGroup::Pose,
        LandmarkGroup::RightHand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LandmarkGroup::Face => "face",
            LandmarkGroup::LeftHand => "left_hand",
            LandmarkGroup::Pose => "pose",
            LandmarkGroup::RightHand => "right_hand",
        }
    }

    /// Number of points the holistic detector emits for this group.
    pub fn holistic_count(&self) -> usize {
        match self {
            LandmarkGroup::Face => 468,
            LandmarkGroup::LeftHand => 21,
            LandmarkGroup::Pose => 33,
            LandmarkGroup::RightHand => 21,
        }
    }
}

impl std::fmt::Display for LandmarkGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One slot of the reference schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceRow {
    #[serde(rename = "type")]
    pub group: LandmarkGroup,
    pub landmark_index: usize,
}

impl ReferenceRow {
    pub fn new(group: LandmarkGroup, landmark_index: usize) -> Self {
        Self { group, landmark_index }
    }
}

/// Ordered, immutable table of landmark slots.
///
/// ## Thread Safety:
/// Built once at startup and shared behind an `Arc`; nothing mutates it afterwards,
/// so every session can read it without locking.
#[derive(Debug, Clone)]
pub struct ReferenceSchema {
    /// Rows in canonical order
    rows: Vec<ReferenceRow>,

    /// Lookup from slot to its position in `rows`
    positions: HashMap<ReferenceRow, usize>,
}

impl ReferenceSchema {
    /// Build a schema from explicit rows.
    ///
    /// ## Errors:
    /// - Empty row list
    /// - The same `(group, landmark_index)` appearing twice
    pub fn new(rows: Vec<ReferenceRow>) -> Result<Self> {
        if rows.is_empty() {
            return Err(anyhow!("Reference schema has no rows"));
        }

        let mut positions = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            if positions.insert(*row, position).is_some() {
                return Err(anyhow!(
                    "Duplicate schema row: {} {}",
                    row.group,
                    row.landmark_index
                ));
            }
        }

        Ok(Self { rows, positions })
    }

    /// The 543-row MediaPipe Holistic layout the reference model was trained on.
    pub fn holistic() -> Self {
        let rows: Vec<ReferenceRow> = LandmarkGroup::ALL
            .iter()
            .flat_map(|&group| {
                (0..group.holistic_count()).map(move |index| ReferenceRow::new(group, index))
            })
            .collect();
        let positions = rows.iter().enumerate().map(|(position, row)| (*row, position)).collect();

        Self { rows, positions }
    }

    /// Parse a schema from its JSON representation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rows: Vec<ReferenceRow> =
            serde_json::from_str(json).context("Invalid reference schema JSON")?;
        Self::new(rows)
    }

    /// Load a schema file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference schema {}", path.display()))?;
        let schema = Self::from_json_str(&json)?;
        tracing::info!(
            path = %path.display(),
            rows = schema.rows_per_frame(),
            face = schema.group_len(LandmarkGroup::Face),
            left_hand = schema.group_len(LandmarkGroup::LeftHand),
            pose = schema.group_len(LandmarkGroup::Pose),
            right_hand = schema.group_len(LandmarkGroup::RightHand),
            "Reference schema loaded"
        );
        Ok(schema)
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    pub fn rows_per_frame(&self) -> usize {
        self.rows.len()
    }

    /// Position of a slot within a frame, if the model knows about it.
    pub fn position(&self, group: LandmarkGroup, landmark_index: usize) -> Option<usize> {
        self.positions.get(&ReferenceRow::new(group, landmark_index)).copied()
    }

    /// Number of slots belonging to `group`.
    pub fn group_len(&self, group: LandmarkGroup) -> usize {
        self.rows.iter().filter(|row| row.group == group).count()
    }

    /// Fail unless this schema produces exactly `expected` rows per frame.
    ///
    /// A mismatch here means the schema and the model disagree about the input
    /// layout, so it is treated as a startup error.
    pub fn ensure_rows_per_frame(&self, expected: usize) -> Result<()> {
        if self.rows.len() != expected {
            return Err(anyhow!(
                "Reference schema has {} rows but the model expects {} per frame",
                self.rows.len(),
                expected
            ));
        }
        Ok(())
    }
}

impl Default for ReferenceSchema {
    fn default() -> Self {
        Self::holistic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holistic_layout() {
        let schema = ReferenceSchema::holistic();
        assert_eq!(schema.rows_per_frame(), ROWS_PER_FRAME);
        assert_eq!(schema.group_len(LandmarkGroup::Face), 468);
        assert_eq!(schema.group_len(LandmarkGroup::Pose), 33);

        // face, left_hand, pose, right_hand
        assert_eq!(schema.position(LandmarkGroup::Face, 0), Some(0));
        assert_eq!(schema.position(LandmarkGroup::LeftHand, 0), Some(468));
        assert_eq!(schema.position(LandmarkGroup::Pose, 0), Some(489));
        assert_eq!(schema.position(LandmarkGroup::RightHand, 20), Some(542));
        assert_eq!(schema.position(LandmarkGroup::Pose, 33), None);
    }

    #[test]
    fn test_schema_from_json() {
        let json = r#"[
            {"type": "pose", "landmark_index": 0},
            {"type": "left_hand", "landmark_index": 0}
        ]"#;
        let schema = ReferenceSchema::from_json_str(json).unwrap();
        assert_eq!(schema.rows_per_frame(), 2);
        assert_eq!(schema.rows()[0], ReferenceRow::new(LandmarkGroup::Pose, 0));
        assert_eq!(schema.position(LandmarkGroup::LeftHand, 0), Some(1));
    }

    #[test]
    fn test_schema_rejects_duplicates_and_empty() {
        let json = r#"[
            {"type": "face", "landmark_index": 3},
            {"type": "face", "landmark_index": 3}
        ]"#;
        assert!(ReferenceSchema::from_json_str(json).is_err());
        assert!(ReferenceSchema::from_json_str("[]").is_err());
        assert!(ReferenceSchema::from_json_str(r#"[{"type": "torso", "landmark_index": 0}]"#).is_err());
    }

    #[test]
    fn test_rows_per_frame_check() {
        let schema = ReferenceSchema::holistic();
        assert!(schema.ensure_rows_per_frame(543).is_ok());
        assert!(schema.ensure_rows_per_frame(542).is_err());
    }
}
