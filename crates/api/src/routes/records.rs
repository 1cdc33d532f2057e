//! Entitlement ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Amount, BookId, BorrowDuration, UserId};
use serde::{Deserialize, Serialize};
use store::{Book, BorrowRecord, EntitlementClaim, Page, RecordQuery};

use super::{ok, parse_id};
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub user_id: Option<String>,
    pub book_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// GET /v1/records — page through the ledger, optionally filtered.
#[tracing::instrument(skip(state, params))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = RecordQuery {
        user_id: params.user_id.as_deref().map(parse_id).transpose()?,
        book_id: params.book_id.as_deref().map(parse_id).transpose()?,
        page: params.page.unwrap_or(1).max(1),
        limit: params.limit.unwrap_or(10).clamp(1, 100),
    };
    let page = state.ledger.list(&query).await?;
    Ok(ok(page))
}

/// Body of a manual grant, e.g. support comping a book.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub book_id: BookId,
    pub user_id: UserId,
    pub duration: BorrowDuration,
    #[serde(default)]
    pub price: Amount,
    #[serde(default = "default_pay_by")]
    pub pay_by: String,
}

fn default_pay_by() -> String {
    "manual".to_string()
}

/// POST /v1/records — grant access outside the payment flow. Follows
/// the same extend-or-insert rule as a paid checkout.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id, book_id = %req.book_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GrantRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    // Resolve through the catalog so an unknown book 404s instead of
    // landing a dangling ledger row.
    state.catalog.get_book(req.book_id).await?;
    let claim = EntitlementClaim {
        book_id: req.book_id,
        user_id: req.user_id,
        duration: req.duration,
        price: req.price,
        pay_by: req.pay_by,
    };
    let record = state.ledger.grant(&claim).await?;
    Ok((StatusCode::CREATED, ok(record)))
}

/// GET /v1/records/{id} — load one ledger record.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state.ledger.get(parse_id(&id)?).await?;
    Ok(ok(record))
}

#[derive(Debug, Default, Deserialize)]
pub struct ShelfParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// One line of a user's active shelf.
#[derive(Debug, Serialize)]
pub struct ShelfEntry {
    pub record: BorrowRecord,
    pub book: Book,
}

/// GET /v1/users/{user_id}/books — the user's active shelf joined to
/// catalog rows.
#[tracing::instrument(skip(state, params))]
pub async fn shelf(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<ShelfParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let entries = state.ledger.active_books(user_id).await?;

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);
    let total = entries.len() as u64;
    // Widen before multiplying; a hostile page number must not overflow.
    let skip = (u64::from(page) - 1).saturating_mul(u64::from(limit));
    let results: Vec<ShelfEntry> = entries
        .into_iter()
        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
        .take(limit as usize)
        .map(|(record, book)| ShelfEntry { record, book })
        .collect();
    Ok(ok(Page::new(results, page, limit, total)))
}
