//! Checkout and fulfillment workflow.
//!
//! This crate turns a book selection into a hosted payment session and,
//! once the provider confirms the payment, into durable entitlements
//! and side-effect jobs.
//!
//! The flow has two legs:
//! 1. `begin` prices the selection and opens the provider session,
//!    returning the approval redirect.
//! 2. `confirm` runs on the provider callback, executes the payment and
//!    fulfills each charged line independently.
//!
//! Line metadata survives the provider round trip packed into each
//! line's SKU token, since the provider carries no structured metadata.

pub mod error;
pub mod gateway;
pub mod http;
pub mod orchestrator;
pub mod sku;

pub use error::CheckoutError;
pub use gateway::{
    ChargedItem, CreatedPayment, ExecutedPayment, GatewayError, InMemoryPaymentGateway,
    PaymentGateway, PaymentRequest,
};
pub use http::HttpPaymentGateway;
pub use orchestrator::{CheckoutConfig, CheckoutOrchestrator, ConfirmationReport, Selection};
pub use sku::Sku;
