//! Auxiliary data for the client: the sign vocabulary and the finger-spelling video index.
//!
//! Both files are read per request so they can be replaced without a restart.

use crate::{error::{AppError, AppResult}, state::AppState};
use actix_web::{web, HttpResponse};
use std::path::Path;

pub async fn vocab_contents(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let path = state.get_config().models.vocab_map_path;
    serve_json_file(&path).await
}

pub async fn fs_contents(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let path = state.get_config().models.fs_contents_path;
    serve_json_file(&path).await
}

async fn serve_json_file(path: &str) -> AppResult<HttpResponse> {
    let contents = tokio::fs::read_to_string(Path::new(path)).await.map_err(|e| {
        tracing::warn!(path = %path, error = %e, "Failed to read content file");
        AppError::NotFound(format!("{}: {}", path, e))
    })?;

    let data: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| AppError::Internal(format!("{} is not valid JSON: {}", path, e)))?;

    Ok(HttpResponse::Ok().json(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::app_state;
    use actix_web::{http::StatusCode, test, App};

    #[actix_web::test]
    async fn test_vocab_contents_served_from_configured_path() {
        let path = std::env::temp_dir().join(format!("vocab-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"0": {"sign": "TV"}}"#).unwrap();

        let state = app_state();
        state.config.write().unwrap().models.vocab_map_path = path.display().to_string();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/vocab-contents", web::get().to(vocab_contents)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/vocab-contents").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["0"]["sign"], "TV");

        std::fs::remove_file(path).ok();
    }

    #[actix_web::test]
    async fn test_missing_file_is_not_found() {
        let state = app_state();
        state.config.write().unwrap().models.fs_contents_path = "/nonexistent/fs.json".to_string();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/fs-contents", web::get().to(fs_contents)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/fs-contents").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
