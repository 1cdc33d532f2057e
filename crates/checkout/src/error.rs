//! Checkout error types.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur while opening or confirming a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The selection list was empty.
    #[error("No books were selected")]
    EmptySelection,

    /// The payment provider rejected or did not complete a call.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The provider reported a state other than approved.
    #[error("Payment {payment_id} is in state '{state}', expected approved")]
    NotApproved { payment_id: String, state: String },

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Store(#[from] store::StoreError),
}
