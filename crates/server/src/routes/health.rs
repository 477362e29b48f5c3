use axum::{Router, response::Json, routing::get};

use openclaw_utils::response::ApiResponse;

use crate::AppState;

pub async fn health_check() -> Json<ApiResponse<String>> {
    Json(ApiResponse::success("OK".to_string()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
