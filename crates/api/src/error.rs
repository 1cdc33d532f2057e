//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, GatewayError};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
///
/// Every variant renders the uniform `{"status":"error","message":...}`
/// envelope with its status code.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The payment provider rejected a call or answered uselessly.
    Gateway(String),
    /// The payment provider did not answer within the deadline.
    GatewayTimeout,
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Gateway(msg) => {
                tracing::error!(error = %msg, "payment gateway error");
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Payment provider timed out".to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "status": "error", "message": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match &err {
            DomainError::BookNotFound(_)
            | DomainError::RecordNotFound(_)
            | DomainError::CartItemNotFound(_) => ApiError::NotFound(err.to_string()),
            DomainError::IsbnTaken(_) => ApiError::BadRequest(err.to_string()),
            DomainError::Store(_) | DomainError::Jobs(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptySelection => ApiError::BadRequest(err.to_string()),
            CheckoutError::Gateway(GatewayError::Timeout) => ApiError::GatewayTimeout,
            CheckoutError::Gateway(_) | CheckoutError::NotApproved { .. } => {
                ApiError::Gateway(err.to_string())
            }
            CheckoutError::Domain(inner) => inner.into(),
            CheckoutError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::BookId;

    #[test]
    fn test_domain_not_found_maps_to_404() {
        let err: ApiError = DomainError::BookNotFound(BookId::new()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_isbn_taken_maps_to_bad_request() {
        let err: ApiError = DomainError::IsbnTaken("978-1".to_string()).into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_gateway_timeout_maps_to_504() {
        let err: ApiError = CheckoutError::Gateway(GatewayError::Timeout).into();
        assert!(matches!(err, ApiError::GatewayTimeout));
    }

    #[test]
    fn test_missing_approval_url_maps_to_gateway() {
        let err: ApiError = CheckoutError::Gateway(GatewayError::NoApprovalUrl).into();
        match err {
            ApiError::Gateway(msg) => assert!(msg.contains("approval URL")),
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
