use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use psry_core::RecordId;
use std::sync::Arc;

/// `GET /records`: every processing record.
#[tracing::instrument(skip(state), fields(operation = "list_records"))]
pub async fn list_records(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let records = state.retrieval.get_all().await?;
    Ok(Json(records))
}

/// `GET /records/{id}`
#[tracing::instrument(skip(state), fields(record_id = %id, operation = "get_record"))]
pub async fn get_record(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let record = state.retrieval.get_one(&RecordId::new(id)).await?;
    Ok(Json(record))
}
