use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::auth::CallerId;
use crate::error::HttpAppError;
use crate::state::AppState;
use crate::utils::upload::extract_image_field;

#[tracing::instrument(skip(state, multipart), fields(caller_id = %caller, operation = "upload_image"))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let (data, filename) = extract_image_field(multipart).await?;
    let view = state.images.upload(caller, &filename, data).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[tracing::instrument(skip(state), fields(caller_id = %caller, operation = "list_images"))]
pub async fn list_images(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
) -> Result<impl IntoResponse, HttpAppError> {
    let views = state.images.get_by_owner(caller).await?;
    Ok(Json(views))
}

#[tracing::instrument(skip(state), fields(caller_id = %caller, image_id = %id, operation = "get_image"))]
pub async fn get_image(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
) -> Result<impl IntoResponse, HttpAppError> {
    let view = state.images.get_by_id(id, caller).await?;
    Ok(Json(view))
}

#[tracing::instrument(skip(state), fields(caller_id = %caller, image_id = %id, operation = "delete_image"))]
pub async fn delete_image(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
) -> Result<impl IntoResponse, HttpAppError> {
    state.images.delete(id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}
