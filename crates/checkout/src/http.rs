//! HTTP payment gateway speaking the provider's REST dialect.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gateway::{
    ChargedItem, CreatedPayment, ExecutedPayment, GatewayError, PaymentGateway, PaymentRequest,
};

/// Deadline applied to every provider call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Payment gateway backed by the provider's REST API.
///
/// Every call carries an explicit deadline; expiry maps to
/// `GatewayError::Timeout` so the boundary can answer with a
/// gateway-timeout status instead of hanging the request.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    secret: String,
    timeout: Duration,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            client_id: client_id.into(),
            secret: secret.into(),
            timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Overrides the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post_json<B: Serialize>(
        &self,
        url: String,
        body: &B,
    ) -> Result<PaymentResponse, GatewayError> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.client_id, Some(&self.secret))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!("{status}: {detail}")));
        }
        response.json().await.map_err(map_transport)
    }
}

fn map_transport(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Provider(error.to_string())
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, request), fields(total = %request.total))]
    async fn create_payment(
        &self,
        request: &PaymentRequest,
    ) -> Result<CreatedPayment, GatewayError> {
        let body = CreateBody::from_request(request);
        let payment = self
            .post_json(format!("{}/payments", self.base_url), &body)
            .await?;

        let approval_url = approval_url(&payment.links)
            .ok_or(GatewayError::NoApprovalUrl)?
            .to_string();
        Ok(CreatedPayment {
            payment_id: payment.id,
            approval_url,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn execute_payment(
        &self,
        payment_id: &str,
        payer_id: &str,
    ) -> Result<ExecutedPayment, GatewayError> {
        let body = ExecuteBody { payer_id };
        let payment = self
            .post_json(
                format!("{}/payments/{payment_id}/execute", self.base_url),
                &body,
            )
            .await?;

        let items = payment
            .transactions
            .into_iter()
            .flat_map(|t| t.item_list.items)
            .map(|item| ChargedItem {
                name: item.name,
                sku: item.sku,
                price: item.price,
            })
            .collect();
        Ok(ExecutedPayment {
            payment_id: payment.id,
            state: payment.state,
            items,
        })
    }
}

fn approval_url(links: &[LinkBody]) -> Option<&str> {
    links
        .iter()
        .find(|link| link.rel == "approval_url")
        .map(|link| link.href.as_str())
}

// -- Wire types --

#[derive(Serialize)]
struct CreateBody<'a> {
    intent: &'static str,
    transactions: Vec<TransactionBody<'a>>,
    redirect_urls: RedirectUrlsBody<'a>,
}

impl<'a> CreateBody<'a> {
    fn from_request(request: &'a PaymentRequest) -> Self {
        Self {
            intent: "sale",
            transactions: vec![TransactionBody {
                item_list: ItemListBody {
                    items: request
                        .items
                        .iter()
                        .map(|item| ItemBody {
                            name: &item.name,
                            sku: &item.sku,
                            price: &item.price,
                            currency: &request.currency,
                            quantity: 1,
                        })
                        .collect(),
                },
                amount: AmountBody {
                    total: &request.total,
                    currency: &request.currency,
                },
            }],
            redirect_urls: RedirectUrlsBody {
                return_url: &request.return_url,
                cancel_url: &request.cancel_url,
            },
        }
    }
}

#[derive(Serialize)]
struct TransactionBody<'a> {
    item_list: ItemListBody<'a>,
    amount: AmountBody<'a>,
}

#[derive(Serialize)]
struct ItemListBody<'a> {
    items: Vec<ItemBody<'a>>,
}

#[derive(Serialize)]
struct ItemBody<'a> {
    name: &'a str,
    sku: &'a str,
    price: &'a str,
    currency: &'a str,
    quantity: u32,
}

#[derive(Serialize)]
struct AmountBody<'a> {
    total: &'a str,
    currency: &'a str,
}

#[derive(Serialize)]
struct RedirectUrlsBody<'a> {
    return_url: &'a str,
    cancel_url: &'a str,
}

#[derive(Serialize)]
struct ExecuteBody<'a> {
    payer_id: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    links: Vec<LinkBody>,
    #[serde(default)]
    transactions: Vec<TransactionResponse>,
}

#[derive(Deserialize)]
struct LinkBody {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct TransactionResponse {
    #[serde(default)]
    item_list: ItemListResponse,
}

#[derive(Deserialize, Default)]
struct ItemListResponse {
    #[serde(default)]
    items: Vec<ItemResponse>,
}

#[derive(Deserialize)]
struct ItemResponse {
    name: String,
    sku: String,
    price: String,
}
