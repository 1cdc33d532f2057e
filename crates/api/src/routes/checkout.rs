//! Checkout and payment callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use checkout::Selection;
use common::{Amount, BookId, BorrowDuration, UserId};
use serde::Deserialize;

use super::ok;
use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub book_id: BookId,
    pub duration: BorrowDuration,
    pub price: Amount,
    #[serde(default)]
    pub refer_code: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// POST /v1/checkout — price the selection and open a payment session.
/// Answers with the provider's approval link for the client to redirect
/// the buyer to.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id, lines = req.items.len()))]
pub async fn begin(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let selections: Vec<Selection> = req
        .items
        .into_iter()
        .map(|item| Selection {
            book_id: item.book_id,
            duration: item.duration,
            price: item.price,
            refer_code: item.refer_code,
            coupon_code: item.coupon_code,
        })
        .collect();
    let created = state.checkout.begin(req.user_id, &selections).await?;
    Ok(ok(serde_json::json!({ "link": created.approval_url })))
}

/// The provider's callback parameters, names preserved verbatim, plus
/// the user id we embedded in the return URL at session time.
#[derive(Debug, Deserialize)]
pub struct SuccessParams {
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    #[serde(rename = "PayerID")]
    pub payer_id: String,
    pub user_id: UserId,
}

/// GET /v1/payments/success — the provider's approval redirect target.
///
/// Confirmation failures are logged, never surfaced: the buyer arrives
/// here via a provider redirect with no interactive error channel, and
/// the provider redelivers its callback on its own schedule.
#[tracing::instrument(skip(state, params), fields(payment_id = %params.payment_id))]
pub async fn success(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SuccessParams>,
) -> Json<serde_json::Value> {
    match state
        .checkout
        .confirm(&params.payment_id, &params.payer_id, params.user_id)
        .await
    {
        Ok(report) => {
            tracing::info!(granted = report.granted, failed = report.failed, "payment confirmed");
        }
        Err(error) => {
            tracing::error!(%error, "payment confirmation failed");
        }
    }
    ok(serde_json::json!({
        "message": "Payment received. Your books will appear on your shelf shortly."
    }))
}

/// GET /v1/payments/cancel — static acknowledgement for an abandoned
/// session.
pub async fn cancel() -> Json<serde_json::Value> {
    ok(serde_json::json!({ "message": "Payment cancelled. Your cart is unchanged." }))
}
