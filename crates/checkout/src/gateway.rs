//! Payment gateway contract and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider returned an error response.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// The provider answered but its response carried no approval link.
    #[error("No approval URL found in the provider response")]
    NoApprovalUrl,

    /// The provider did not answer within the deadline.
    #[error("Payment provider timed out")]
    Timeout,
}

/// One line item sent to and echoed back by the provider.
///
/// `price` is the already formatted two-decimal string; amounts cross
/// this boundary pre-rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargedItem {
    pub name: String,
    pub sku: String,
    pub price: String,
}

/// A request to open a hosted payment session.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub items: Vec<ChargedItem>,
    pub total: String,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// A session the provider has opened and wants the payer redirected to.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub approval_url: String,
}

/// The provider's answer to an execute call. `items` is the system of
/// record for what was actually paid for.
#[derive(Debug, Clone)]
pub struct ExecutedPayment {
    pub payment_id: String,
    pub state: String,
    pub items: Vec<ChargedItem>,
}

/// Trait for the payment provider's create/execute handshake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hosted payment session and returns its approval URL.
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<CreatedPayment, GatewayError>;

    /// Finalizes a session the payer has approved.
    async fn execute_payment(
        &self,
        payment_id: &str,
        payer_id: &str,
    ) -> Result<ExecutedPayment, GatewayError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    payments: HashMap<String, PaymentRequest>,
    executed: Vec<String>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_execute: bool,
    omit_approval_url: bool,
    execute_state: Option<String>,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail on the next create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the gateway to fail on the next execute call.
    pub fn set_fail_on_execute(&self, fail: bool) {
        self.state.write().unwrap().fail_on_execute = fail;
    }

    /// Configures create responses to come back without an approval link.
    pub fn set_omit_approval_url(&self, omit: bool) {
        self.state.write().unwrap().omit_approval_url = omit;
    }

    /// Overrides the state reported by execute responses.
    pub fn set_execute_state(&self, state: impl Into<String>) {
        self.state.write().unwrap().execute_state = Some(state.into());
    }

    /// Returns the number of open payment sessions.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns the number of executed payments.
    pub fn executed_count(&self) -> usize {
        self.state.read().unwrap().executed.len()
    }

    /// Returns the most recently created payment request.
    pub fn last_request(&self) -> Option<PaymentRequest> {
        let state = self.state.read().unwrap();
        let last_id = format!("PAY-{:04}", state.next_id);
        state.payments.get(&last_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<CreatedPayment, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(GatewayError::Provider("payment rejected".to_string()));
        }
        if state.omit_approval_url {
            return Err(GatewayError::NoApprovalUrl);
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.payments.insert(payment_id.clone(), request.clone());

        Ok(CreatedPayment {
            approval_url: format!("https://pay.example/approve/{payment_id}"),
            payment_id,
        })
    }

    async fn execute_payment(
        &self,
        payment_id: &str,
        _payer_id: &str,
    ) -> Result<ExecutedPayment, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_execute {
            return Err(GatewayError::Provider(
                "payment execution failed".to_string(),
            ));
        }

        let request = state
            .payments
            .get(payment_id)
            .ok_or_else(|| GatewayError::Provider(format!("unknown payment {payment_id}")))?;
        let items = request.items.clone();
        state.executed.push(payment_id.to_string());

        Ok(ExecutedPayment {
            payment_id: payment_id.to_string(),
            state: state
                .execute_state
                .clone()
                .unwrap_or_else(|| "approved".to_string()),
            items,
        })
    }
}
