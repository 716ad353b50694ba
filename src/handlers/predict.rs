//! Stateless prediction over a whole recording: `POST /api/vocab-predict`.

use crate::{error::{AppError, AppResult}, landmarks::RawFrameDetections, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

/// `{"allLandmarks": [frame, frame, ...]}`. Individual frames may be `null`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchPredictRequest {
    #[serde(rename = "allLandmarks", default)]
    pub all_landmarks: Vec<Option<RawFrameDetections>>,
}

pub async fn vocab_predict(
    state: web::Data<AppState>,
    body: web::Json<BatchPredictRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let top_k = state.top_k();
    let predictor = state.predictor.clone();

    tracing::debug!(frames = request.all_landmarks.len(), "Batch prediction requested");

    let outcome = web::block(move || predictor.predict_batch(&request.all_landmarks, top_k))
        .await
        .map_err(|e| AppError::Internal(format!("Prediction task failed: {}", e)))??;

    state.record_outcome(&outcome);
    Ok(HttpResponse::Ok().json(outcome))
}
