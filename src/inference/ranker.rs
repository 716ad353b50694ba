//! # Ranking
//!
//! Turns the model's raw score vector into the top-K candidate signs.
//!
//! ## Rules:
//! - All scores NaN → `NoConfidentPrediction` (distinct from "no frames")
//! - NaN scores rank below every real score and are never returned as candidates
//! - Descending score, ties broken by ascending ordinal
//! - Ordinals missing from the vocabulary are logged and skipped

use crate::inference::vocabulary::SignVocabulary;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// Default number of candidates returned per prediction.
pub const DEFAULT_TOP_K: usize = 10;

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignCandidate {
    pub sign_id: usize,
    pub sign: String,
    pub confidence: f32,
}

/// Result of one predict cycle, shared by the streaming and batch paths.
///
/// Serialized as `{"status": "ranked", "results": [...]}`,
/// `{"status": "no_confident_prediction"}` or `{"status": "no_frames"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "results", rename_all = "snake_case")]
pub enum PredictionOutcome {
    /// Nothing was buffered, so the model was never run
    NoFrames,
    /// The model ran but every score was NaN
    NoConfidentPrediction,
    /// Candidates in descending confidence
    Ranked(Vec<SignCandidate>),
}

impl PredictionOutcome {
    pub fn candidates(&self) -> &[SignCandidate] {
        match self {
            PredictionOutcome::Ranked(candidates) => candidates,
            _ => &[],
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            PredictionOutcome::NoFrames => "no_frames",
            PredictionOutcome::NoConfidentPrediction => "no_confident_prediction",
            PredictionOutcome::Ranked(_) => "ranked",
        }
    }
}

/// Rank `scores` (indexed by ordinal) against `vocabulary`.
///
/// `top_k` is capped at `DEFAULT_TOP_K`.
pub fn rank(scores: &[f32], vocabulary: &SignVocabulary, top_k: usize) -> PredictionOutcome {
    let top_k = top_k.min(DEFAULT_TOP_K);
    if scores.iter().all(|score| score.is_nan()) {
        return PredictionOutcome::NoConfidentPrediction;
    }

    let mut ordinals: Vec<usize> = (0..scores.len()).collect();
    ordinals.sort_by(|&a, &b| compare_scores(scores[a], scores[b]).then(a.cmp(&b)));

    let mut candidates = Vec::with_capacity(top_k.min(scores.len()));
    for ordinal in ordinals.into_iter().take(top_k) {
        let confidence = scores[ordinal];
        if confidence.is_nan() {
            continue;
        }

        match vocabulary.sign(ordinal) {
            Some(sign) => candidates.push(SignCandidate {
                sign_id: ordinal,
                sign: sign.to_string(),
                confidence,
            }),
            None => warn!(sign_id = ordinal, "Model returned an ordinal missing from the vocabulary"),
        }
    }

    PredictionOutcome::Ranked(candidates)
}

/// Descending order with NaN treated as negative infinity.
fn compare_scores(a: f32, b: f32) -> Ordering {
    let a = if a.is_nan() { f32::NEG_INFINITY } else { a };
    let b = if b.is_nan() { f32::NEG_INFINITY } else { b };
    b.total_cmp(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> SignVocabulary {
        ["TV", "after", "airplane", "all"]
            .iter()
            .enumerate()
            .map(|(i, sign)| (i, sign.to_string()))
            .collect()
    }

    fn ids(outcome: &PredictionOutcome) -> Vec<usize> {
        outcome.candidates().iter().map(|c| c.sign_id).collect()
    }

    #[test]
    fn test_ties_break_by_ordinal_and_nan_is_last() {
        let scores = [0.5, 0.9, 0.9, f32::NAN];
        let outcome = rank(&scores, &vocabulary(), 3);

        assert_eq!(ids(&outcome), vec![1, 2, 0]);
        let confidences: Vec<f32> = outcome.candidates().iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.9, 0.5]);
        assert_eq!(outcome.candidates()[0].sign, "after");
    }

    #[test]
    fn test_nan_never_becomes_a_candidate() {
        let scores = [0.5, f32::NAN, 0.1, f32::NAN];
        let outcome = rank(&scores, &vocabulary(), 10);
        assert_eq!(ids(&outcome), vec![0, 2]);
    }

    #[test]
    fn test_all_nan_is_no_confident_prediction() {
        let scores = [f32::NAN; 4];
        let outcome = rank(&scores, &vocabulary(), 3);
        assert_eq!(outcome, PredictionOutcome::NoConfidentPrediction);
        assert_ne!(outcome, PredictionOutcome::NoFrames);
        assert_ne!(outcome, PredictionOutcome::Ranked(Vec::new()));
    }

    #[test]
    fn test_unknown_ordinal_is_skipped() {
        let scores = [0.1, 0.2, 0.3, 0.4, 0.95];
        let outcome = rank(&scores, &vocabulary(), 3);
        // ordinal 4 is outside the vocabulary, so only two of the top three survive
        assert_eq!(ids(&outcome), vec![3, 2]);
    }

    #[test]
    fn test_top_k_truncation() {
        let scores = [0.1, 0.4, 0.3, 0.2];
        assert_eq!(ids(&rank(&scores, &vocabulary(), 1)), vec![1]);
        assert_eq!(ids(&rank(&scores, &vocabulary(), 10)), vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_top_k_is_capped() {
        let vocabulary: SignVocabulary = (0..30).map(|i| (i, format!("sign-{}", i))).collect();
        let scores: Vec<f32> = (0..30).map(|i| i as f32 / 30.0).collect();

        let outcome = rank(&scores, &vocabulary, 50);
        assert_eq!(outcome.candidates().len(), DEFAULT_TOP_K);
        assert_eq!(outcome.candidates()[0].sign_id, 29);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PredictionOutcome::Ranked(vec![SignCandidate {
            sign_id: 1,
            sign: "after".to_string(),
            confidence: 0.5,
        }]);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "ranked");
        assert_eq!(json["results"][0]["sign"], "after");
        assert_eq!(json["results"][0]["sign_id"], 1);

        let json = serde_json::to_value(PredictionOutcome::NoFrames).unwrap();
        assert_eq!(json, serde_json::json!({"status": "no_frames"}));
    }
}
