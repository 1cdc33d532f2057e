//! Cart endpoints. Additions are acknowledged before they land; the
//! line appears once the queued job runs.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{BookId, UserId};
use serde::Deserialize;

use super::{ok, parse_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub user_id: UserId,
    pub book_id: BookId,
}

/// POST /v1/carts — queue an add-to-cart for the pair.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id, book_id = %req.book_id))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    state.carts.add(req.user_id, req.book_id).await?;
    Ok((StatusCode::ACCEPTED, ok(serde_json::Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub user_id: String,
}

/// GET /v1/carts?user_id=.. — list the user's cart lines.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lines = state.carts.list(parse_id(&params.user_id)?).await?;
    Ok(ok(lines))
}

/// DELETE /v1/carts/{id} — remove one cart line.
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.carts.remove(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
