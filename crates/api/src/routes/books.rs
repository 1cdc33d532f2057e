//! Catalog browse and admin endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Amount, BookId};
use jobs::{BookAccessJob, Job};
use serde::Deserialize;
use store::{BookPatch, BookQuery, NewBook, SortSpec};

use super::{ok, parse_id};
use crate::AppState;
use crate::error::ApiError;

/// Query parameters for catalog browsing. Names follow the public API
/// convention (camelCase).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseParams {
    pub search: Option<String>,
    pub genre: Option<String>,
    pub from_price: Option<f64>,
    pub to_price: Option<f64>,
    pub sort_by: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl BrowseParams {
    fn into_query(self) -> BookQuery {
        // The price filter only applies when both bounds are non-zero.
        let price_between = match (self.from_price, self.to_price) {
            (Some(from), Some(to)) if from != 0.0 && to != 0.0 => {
                Some((Amount::new(from), Amount::new(to)))
            }
            _ => None,
        };
        BookQuery {
            search: self.search,
            genre: self.genre,
            price_between,
            sort: self.sort_by.as_deref().map(SortSpec::parse),
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(10).clamp(1, 100),
        }
    }
}

/// GET /v1/books — browse the catalog with filters and pagination.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BrowseParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = state.catalog.browse(&params.into_query()).await?;
    Ok(ok(page))
}

/// POST /v1/books — add a book to the catalog.
#[tracing::instrument(skip(state, new_book), fields(isbn = %new_book.isbn))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(new_book): Json<NewBook>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if new_book.prices.is_empty() {
        return Err(ApiError::BadRequest(
            "A book needs at least one price tier".to_string(),
        ));
    }
    let book = state.catalog.create_book(new_book).await?;
    Ok((StatusCode::CREATED, ok(book)))
}

/// GET /v1/books/{id} — cached detail read. The access counter moves in
/// the background so a slow store cannot delay the response.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id: BookId = parse_id(&id)?;
    let book = state.catalog.get_book(id).await?;
    if let Err(error) = state
        .queue
        .enqueue(Job::IncreaseAccessTimeBook(BookAccessJob { book_id: id }))
        .await
    {
        tracing::warn!(%error, "failed to enqueue access-counter bump");
    }
    Ok(ok(book))
}

/// PATCH /v1/books/{id} — partial update with cache invalidation.
#[tracing::instrument(skip(state, patch))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<BookPatch>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let book = state.catalog.update_book(parse_id(&id)?, patch).await?;
    Ok(ok(book))
}

/// DELETE /v1/books/{id} — remove a book and its cached copy.
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_book(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
