use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{Field, MultipartError},
    },
    response::Json as ResponseJson,
    routing::post,
};
use services::services::{
    evaluation::{EvaluationReport, EvaluationRequest},
    upload::UploadedFile,
};
use utils::response::ApiResponse;

use crate::{AppState, error::ApiError};

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().route(
        "/evaluate",
        post(evaluate).layer(DefaultBodyLimit::max(state.config().max_upload_bytes)),
    )
}

/// Runs every uploaded input through the selected model and compares the
/// output with its expected file.
pub async fn evaluate(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<ResponseJson<ApiResponse<EvaluationReport>>, ApiError> {
    let request = read_form(multipart).await?;
    tracing::debug!(
        "Received evaluation form: {} input file(s), {} expected file(s)",
        request.input_files.len(),
        request.expected_files.len()
    );
    let report = state.evaluation().run(request).await?;
    Ok(ResponseJson(ApiResponse::success(report)))
}

async fn read_form(mut multipart: Multipart) -> Result<EvaluationRequest, MultipartError> {
    let mut request = EvaluationRequest::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue;
        };
        match name.as_str() {
            "api_key" => request.api_key = field.text().await?,
            "gemini_model" => request.model = Some(field.text().await?),
            "temperature" => request.temperature = Some(field.text().await?),
            "top_p" => request.top_p = Some(field.text().await?),
            "top_k" => request.top_k = Some(field.text().await?),
            "system_message_file" => request.system_message = Some(read_file(field).await?),
            "input_message_files" => request.input_files.push(read_file(field).await?),
            "expected_output_files" => request.expected_files.push(read_file(field).await?),
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }
    Ok(request)
}

async fn read_file(field: Field<'_>) -> Result<UploadedFile, MultipartError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let data = field.bytes().await?;
    Ok(UploadedFile::new(file_name, data))
}
