//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::{AppState, create_app};
use checkout::{
    CheckoutConfig, CheckoutOrchestrator, HttpPaymentGateway, InMemoryPaymentGateway,
    PaymentGateway,
};
use domain::{CartService, CatalogService, LedgerService};
use jobs::{InMemoryJobQueue, JobRunner};
use store::cache::Cache;
use store::{
    AffiliateStore, BookStore, CartStore, CouponStore, InMemoryAffiliateStore, InMemoryBookStore,
    InMemoryCache, InMemoryCartStore, InMemoryCouponStore, InMemoryRecordStore,
    PostgresAffiliateStore, PostgresBookStore, PostgresCartStore, PostgresCouponStore,
    PostgresRecordStore, RecordStore, RedisCache,
};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

struct Stores {
    books: Arc<dyn BookStore>,
    records: Arc<dyn RecordStore>,
    carts: Arc<dyn CartStore>,
    coupons: Arc<dyn CouponStore>,
    affiliates: Arc<dyn AffiliateStore>,
}

async fn build_stores(config: &Config) -> Stores {
    match &config.database_url {
        Some(url) => {
            let pool = store::connect(url).await.expect("failed to connect to PostgreSQL");
            store::run_migrations(&pool).await.expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");
            Stores {
                books: Arc::new(PostgresBookStore::new(pool.clone())),
                records: Arc::new(PostgresRecordStore::new(pool.clone())),
                carts: Arc::new(PostgresCartStore::new(pool.clone())),
                coupons: Arc::new(PostgresCouponStore::new(pool.clone())),
                affiliates: Arc::new(PostgresAffiliateStore::new(pool)),
            }
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            Stores {
                books: Arc::new(InMemoryBookStore::new()),
                records: Arc::new(InMemoryRecordStore::new()),
                carts: Arc::new(InMemoryCartStore::new()),
                coupons: Arc::new(InMemoryCouponStore::new()),
                affiliates: Arc::new(InMemoryAffiliateStore::new()),
            }
        }
    }
}

async fn build_cache(config: &Config) -> Arc<dyn Cache> {
    match &config.redis_url {
        Some(url) => {
            let cache = RedisCache::connect(url).await.expect("failed to connect to Redis");
            tracing::info!("using Redis cache");
            Arc::new(cache)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using the in-memory cache");
            Arc::new(InMemoryCache::new())
        }
    }
}

fn build_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match &config.payment_api_url {
        Some(url) => Arc::new(
            HttpPaymentGateway::new(url, &config.payment_client_id, &config.payment_secret)
                .with_timeout(config.payment_timeout),
        ),
        None => {
            tracing::warn!("PAYMENT_API_URL not set, using the in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Construct storage, cache, queue, and gateway handles
    let stores = build_stores(&config).await;
    let cache = build_cache(&config).await;
    let gateway = build_gateway(&config);
    let queue = InMemoryJobQueue::new();

    // 4. Wire the services
    let catalog = Arc::new(
        CatalogService::new(stores.books.clone(), cache).with_ttl(config.cache_ttl),
    );
    let ledger = Arc::new(LedgerService::new(
        stores.records.clone(),
        stores.books.clone(),
    ));
    let carts = Arc::new(CartService::new(
        stores.carts.clone(),
        stores.books.clone(),
        Arc::new(queue.clone()),
    ));
    let checkout_config = CheckoutConfig {
        return_url: format!("{}/v1/payments/success", config.public_url),
        cancel_url: format!("{}/v1/payments/cancel", config.public_url),
        currency: "USD".to_string(),
    };
    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        gateway,
        catalog.clone(),
        ledger.clone(),
        stores.coupons.clone(),
        Arc::new(queue.clone()),
        checkout_config,
    ));

    // 5. Start the job runner on its own task
    let runner = JobRunner::new(
        queue.clone(),
        stores.books.clone(),
        stores.carts.clone(),
        stores.coupons.clone(),
        stores.affiliates.clone(),
    );
    tokio::spawn(runner.run());

    // 6. Build the application
    let state = Arc::new(AppState {
        catalog,
        ledger,
        carts,
        checkout: orchestrator,
        queue: Arc::new(queue),
    });
    let app = create_app(state, metrics_handle);

    // 7. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
