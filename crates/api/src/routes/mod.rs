//! HTTP route handlers.

pub mod books;
pub mod carts;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod records;

use serde::Serialize;

use crate::error::ApiError;

/// Uniform success envelope: `{"status":"success","data":...}`.
pub(crate) fn ok<T: Serialize>(data: T) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "success", "data": data }))
}

/// Parses a UUID-backed path or query id, mapping failures to a 400.
pub(crate) fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid id '{raw}': {e}")))
}
