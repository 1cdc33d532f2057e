//! Checkout orchestrator: prices a selection, runs the provider
//! handshake, and turns the approved payment into entitlements and
//! side-effect jobs.

use std::sync::Arc;

use common::{Amount, BookId, BorrowDuration, UserId};
use domain::{CatalogService, LedgerService};
use futures_util::future::join_all;
use jobs::{CartCleanupJob, CommissionJob, CouponUsageJob, Job, JobQueue};
use store::{CouponStore, EntitlementClaim};

use crate::error::CheckoutError;
use crate::gateway::{ChargedItem, CreatedPayment, PaymentGateway, PaymentRequest};
use crate::sku::Sku;

/// Payment channel tag stamped on every record this flow grants.
const PAY_BY: &str = "provider";

/// One line of the buyer's selection as submitted by the client.
#[derive(Debug, Clone)]
pub struct Selection {
    pub book_id: BookId,
    pub duration: BorrowDuration,
    /// The tier price the client displayed; coupons are applied to it
    /// server side.
    pub price: Amount,
    pub refer_code: Option<String>,
    pub coupon_code: Option<String>,
}

/// Redirect endpoints and currency used for payment sessions.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Where the provider sends the buyer after approval. The acting
    /// user's id is appended as a query parameter because the
    /// provider's callback carries no user identity of its own.
    pub return_url: String,
    pub cancel_url: String,
    pub currency: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            return_url: "http://localhost:3000/v1/payments/success".to_string(),
            cancel_url: "http://localhost:3000/v1/payments/cancel".to_string(),
            currency: "USD".to_string(),
        }
    }
}

/// What a confirmed payment ended up fulfilling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationReport {
    pub payment_id: String,
    /// Lines granted an entitlement.
    pub granted: usize,
    /// Lines skipped or failed; each is logged with its reason.
    pub failed: usize,
}

/// Orchestrates the two-leg checkout flow.
///
/// Leg one prices the selection and opens a hosted payment session,
/// returning the provider's approval redirect. Leg two runs on the
/// provider's callback: the payment is executed and every charged line
/// is fulfilled independently, so one bad line cannot hold back the
/// rest.
pub struct CheckoutOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<CatalogService>,
    ledger: Arc<LedgerService>,
    coupons: Arc<dyn CouponStore>,
    queue: Arc<dyn JobQueue>,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<CatalogService>,
        ledger: Arc<LedgerService>,
        coupons: Arc<dyn CouponStore>,
        queue: Arc<dyn JobQueue>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            ledger,
            coupons,
            queue,
            config,
        }
    }

    /// Opens a payment session for the selected books.
    ///
    /// Returns the provider's approval redirect; nothing is persisted
    /// on our side until the provider confirms the payment.
    #[tracing::instrument(skip(self, selections), fields(lines = selections.len()))]
    pub async fn begin(
        &self,
        user_id: UserId,
        selections: &[Selection],
    ) -> Result<CreatedPayment, CheckoutError> {
        metrics::counter!("checkout_sessions_total").increment(1);
        if selections.is_empty() {
            return Err(CheckoutError::EmptySelection);
        }

        // 1. Price every line and pack its metadata into the SKU.
        //    Totals accumulate at full precision; formatting to two
        //    decimals happens only on the provider request.
        let mut items = Vec::with_capacity(selections.len());
        let mut total = Amount::zero();
        for selection in selections {
            let book = self.catalog.get_book(selection.book_id).await?;
            let price = self.discounted_price(selection).await?;
            let sku = Sku::new(
                selection.book_id,
                selection.duration,
                selection.refer_code.clone().unwrap_or_default(),
                selection.coupon_code.clone().unwrap_or_default(),
            );
            total += price;
            items.push(ChargedItem {
                name: book.title,
                sku: sku.to_string(),
                price: price.to_string(),
            });
        }

        // 2. Open the hosted session with the provider.
        let request = PaymentRequest {
            items,
            total: total.to_string(),
            currency: self.config.currency.clone(),
            return_url: format!("{}?user_id={}", self.config.return_url, user_id),
            cancel_url: self.config.cancel_url.clone(),
        };
        let created = self.gateway.create_payment(&request).await?;

        tracing::info!(payment_id = %created.payment_id, total = %total, "payment session opened");
        Ok(created)
    }

    /// Executes an approved payment and fulfills every line it covers.
    ///
    /// The provider's charged lines are the system of record for what
    /// was paid, not the original request, so a client reordering books
    /// mid-flow cannot change what it gets. Re-running a confirmation
    /// converges: grants extend in place and the job consumers dedupe.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        payment_id: &str,
        payer_id: &str,
        user_id: UserId,
    ) -> Result<ConfirmationReport, CheckoutError> {
        metrics::counter!("checkout_confirmations_total").increment(1);
        let confirm_start = std::time::Instant::now();

        // 1. Execute the payment with the provider.
        let executed = self.gateway.execute_payment(payment_id, payer_id).await?;
        if executed.state != "approved" {
            return Err(CheckoutError::NotApproved {
                payment_id: executed.payment_id,
                state: executed.state,
            });
        }

        // 2. Fulfill each charged line as its own unit of work.
        let outcomes = join_all(
            executed
                .items
                .iter()
                .map(|item| self.fulfill_line(user_id, &executed.payment_id, item)),
        )
        .await;
        let granted = outcomes.iter().filter(|fulfilled| **fulfilled).count();
        let failed = outcomes.len() - granted;

        let duration = confirm_start.elapsed().as_secs_f64();
        metrics::histogram!("checkout_confirm_duration_seconds").record(duration);
        tracing::info!(
            payment_id = %executed.payment_id,
            granted,
            failed,
            duration,
            "checkout confirmed"
        );
        Ok(ConfirmationReport {
            payment_id: executed.payment_id,
            granted,
            failed,
        })
    }

    /// The line price after any coupon. Unknown codes are ignored so a
    /// stale coupon cannot block the purchase.
    async fn discounted_price(&self, selection: &Selection) -> Result<Amount, CheckoutError> {
        let Some(code) = selection
            .coupon_code
            .as_deref()
            .filter(|code| !code.is_empty())
        else {
            return Ok(selection.price);
        };
        match self.coupons.find_by_code(code).await? {
            Some(coupon) => Ok(selection.price.less_percent(coupon.percent)),
            None => Ok(selection.price),
        }
    }

    /// Grants the entitlement for one charged line and fans out its
    /// side-effect jobs. Returns whether the grant landed.
    async fn fulfill_line(&self, user_id: UserId, payment_id: &str, item: &ChargedItem) -> bool {
        let Some(sku) = Sku::parse(&item.sku) else {
            metrics::counter!("checkout_lines_skipped_total").increment(1);
            tracing::warn!(sku = %item.sku, "skipping charged line with undecodable sku");
            return false;
        };
        let Ok(paid) = item.price.parse::<f64>().map(Amount::new) else {
            metrics::counter!("checkout_lines_skipped_total").increment(1);
            tracing::warn!(price = %item.price, "skipping charged line with undecodable price");
            return false;
        };

        let claim = EntitlementClaim {
            book_id: sku.book_id,
            user_id,
            duration: sku.duration,
            price: paid,
            pay_by: PAY_BY.to_string(),
        };
        // The payment already went through, so the bookkeeping jobs are
        // owed regardless of whether the grant itself succeeds.
        let (granted, ()) = tokio::join!(
            self.ledger.grant(&claim),
            self.enqueue_side_effects(user_id, payment_id, &sku, paid),
        );

        match granted {
            Ok(record) => {
                tracing::info!(record_id = %record.id, book_id = %sku.book_id, "charged line fulfilled");
                true
            }
            Err(error) => {
                metrics::counter!("checkout_lines_failed_total").increment(1);
                tracing::error!(%error, book_id = %sku.book_id, "failed to grant charged line");
                false
            }
        }
    }

    async fn enqueue_side_effects(
        &self,
        user_id: UserId,
        payment_id: &str,
        sku: &Sku,
        paid: Amount,
    ) {
        if !sku.refer_code.is_empty() {
            self.enqueue(Job::CreateCommissionAffiliate(CommissionJob {
                refer_code: sku.refer_code.clone(),
                book_id: sku.book_id,
                payment_id: payment_id.to_string(),
                price: paid,
                duration: sku.duration,
            }))
            .await;
        }
        if !sku.coupon_code.is_empty() {
            self.enqueue(Job::AddCouponUsage(CouponUsageJob {
                code: sku.coupon_code.clone(),
                user_id,
            }))
            .await;
        }
        self.enqueue(Job::CheckCartToDelete(CartCleanupJob {
            user_id,
            book_id: sku.book_id,
        }))
        .await;
    }

    /// Queue errors stay local; a lost side effect must not fail the
    /// line that owed it.
    async fn enqueue(&self, job: Job) {
        let kind = job.kind();
        if let Err(error) = self.queue.enqueue(job).await {
            tracing::warn!(%error, kind, "failed to enqueue side effect");
        }
    }
}
