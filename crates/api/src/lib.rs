//! HTTP surface for the e-library checkout backend.
//!
//! Wires the catalog, ledger, cart, and checkout services into an axum
//! router with structured logging (tracing) and Prometheus metrics.
//! All collaborators are dependency-injected handles constructed once
//! at startup; handlers see them through [`AppState`].

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use checkout::{CheckoutConfig, CheckoutOrchestrator, InMemoryPaymentGateway};
use domain::{CartService, CatalogService, LedgerService};
use jobs::{InMemoryJobQueue, JobQueue, JobRunner};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{
    InMemoryAffiliateStore, InMemoryBookStore, InMemoryCache, InMemoryCartStore,
    InMemoryCouponStore, InMemoryRecordStore,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub ledger: Arc<LedgerService>,
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub queue: Arc<dyn JobQueue>,
}

/// Creates the axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/v1/checkout", post(routes::checkout::begin))
        .route("/v1/payments/success", get(routes::checkout::success))
        .route("/v1/payments/cancel", get(routes::checkout::cancel))
        .route("/v1/books", get(routes::books::list))
        .route("/v1/books", post(routes::books::create))
        .route("/v1/books/{id}", get(routes::books::get))
        .route("/v1/books/{id}", axum::routing::patch(routes::books::update))
        .route("/v1/books/{id}", delete(routes::books::remove))
        .route("/v1/records", get(routes::records::list))
        .route("/v1/records", post(routes::records::create))
        .route("/v1/records/{id}", get(routes::records::get))
        .route("/v1/users/{user_id}/books", get(routes::records::shelf))
        .route("/v1/carts", get(routes::carts::list))
        .route("/v1/carts", post(routes::carts::add))
        .route("/v1/carts/{id}", delete(routes::carts::remove))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// A fully wired application on in-memory backends.
///
/// Built for integration tests, which reach into the exposed stores to
/// seed data and into the runner to drain queued jobs deterministically.
pub struct InMemoryApp {
    pub state: Arc<AppState>,
    pub runner: JobRunner,
    pub gateway: InMemoryPaymentGateway,
    pub queue: InMemoryJobQueue,
    pub cache: Arc<InMemoryCache>,
    pub books: Arc<InMemoryBookStore>,
    pub records: Arc<InMemoryRecordStore>,
    pub carts: Arc<InMemoryCartStore>,
    pub coupons: Arc<InMemoryCouponStore>,
    pub affiliates: Arc<InMemoryAffiliateStore>,
}

/// Builds the in-memory application with the given checkout redirects.
pub fn create_in_memory_app(checkout_config: CheckoutConfig) -> InMemoryApp {
    let books = Arc::new(InMemoryBookStore::new());
    let records = Arc::new(InMemoryRecordStore::new());
    let carts = Arc::new(InMemoryCartStore::new());
    let coupons = Arc::new(InMemoryCouponStore::new());
    let affiliates = Arc::new(InMemoryAffiliateStore::new());
    let cache = Arc::new(InMemoryCache::new());
    let queue = InMemoryJobQueue::new();
    let gateway = InMemoryPaymentGateway::new();

    let catalog = Arc::new(CatalogService::new(books.clone(), cache.clone()));
    let ledger = Arc::new(LedgerService::new(records.clone(), books.clone()));
    let cart_service = Arc::new(CartService::new(
        carts.clone(),
        books.clone(),
        Arc::new(queue.clone()),
    ));
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        Arc::new(gateway.clone()),
        catalog.clone(),
        ledger.clone(),
        coupons.clone(),
        Arc::new(queue.clone()),
        checkout_config,
    ));
    let runner = JobRunner::new(
        queue.clone(),
        books.clone(),
        carts.clone(),
        coupons.clone(),
        affiliates.clone(),
    );

    let state = Arc::new(AppState {
        catalog,
        ledger,
        carts: cart_service,
        checkout: orchestrator,
        queue: Arc::new(queue.clone()),
    });

    InMemoryApp {
        state,
        runner,
        gateway,
        queue,
        cache,
        books,
        records,
        carts,
        coupons,
        affiliates,
    }
}
