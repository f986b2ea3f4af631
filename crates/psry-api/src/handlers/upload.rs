use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use psry_pipeline::UploadRequest;
use std::sync::Arc;

/// `POST /upload`: store a base64-encoded image and create its record.
#[tracing::instrument(skip(state, request), fields(file_name = %request.name, operation = "upload"))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<UploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.upload.upload(request).await?;
    Ok(Json(response))
}
