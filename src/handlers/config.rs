use crate::{error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config
    })))
}

/// Patch runtime settings. Only `server` and `performance` fields are applied; model
/// settings take effect on restart.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config
        .update_from_json(&json_str)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state
        .update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    tracing::info!(
        top_k = current_config.performance.top_k,
        max_sessions = current_config.performance.max_concurrent_sessions,
        "Configuration updated"
    );

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": current_config
    })))
}
