use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::get,
};
use serde::Serialize;
use services::services::generative::GenerationConfig;
use utils::response::ApiResponse;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/models", get(get_models))
}

/// Everything the form needs to render its controls.
#[derive(Debug, Serialize)]
pub struct FormOptions {
    pub models: Vec<String>,
    pub default_model: String,
    pub generation: GenerationConfig,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
}

async fn get_models(State(state): State<AppState>) -> ResponseJson<ApiResponse<FormOptions>> {
    let config = state.config();
    ResponseJson(ApiResponse::success(FormOptions {
        models: config.models.clone(),
        default_model: config.default_model.clone(),
        generation: config.generation,
        allowed_extensions: config.allowed_extensions.clone(),
        max_upload_bytes: config.max_upload_bytes,
    }))
}
