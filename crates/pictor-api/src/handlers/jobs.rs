use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pictor_core::models::TransformRequest;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::CallerId;
use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransformResponse {
    pub job_id: Uuid,
}

/// Queue a transform; the result is written by a worker later.
#[tracing::instrument(skip(state, request), fields(caller_id = %caller, image_id = %id, operation = "submit_transform"))]
pub async fn submit_transform(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    ValidatedJson(request): ValidatedJson<TransformRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let job_id = state.transforms.submit(id, caller, request).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitTransformResponse { job_id })))
}

#[tracing::instrument(skip(state), fields(caller_id = %caller, job_id = %id, operation = "get_job"))]
pub async fn get_job(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
) -> Result<impl IntoResponse, HttpAppError> {
    let status = state.transforms.job_status(id, caller).await?;
    Ok(Json(status))
}
