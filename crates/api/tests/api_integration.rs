//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::CheckoutConfig;
use common::{Amount, BorrowDuration, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{
    Affiliate, AffiliateStore, Book, BookStore, Coupon, CouponStore, EntitlementClaim, NewBook,
    PriceTier, RecordStore,
};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, api::InMemoryApp) {
    let app = api::create_in_memory_app(CheckoutConfig::default());
    let router = api::create_app(app.state.clone(), get_metrics_handle());
    (router, app)
}

async fn seed_book(app: &api::InMemoryApp, title: &str, isbn: &str) -> Book {
    let book = NewBook {
        title: title.to_string(),
        author: "Frank Herbert".to_string(),
        isbn: isbn.to_string(),
        genres: vec!["sci-fi".to_string()],
        summary: String::new(),
        cover_image: String::new(),
        total_pages: 412,
        digital_content: String::new(),
        published_date: None,
        prices: vec![
            PriceTier {
                duration: BorrowDuration::OneMonth,
                price: Amount::new(10.0),
            },
            PriceTier {
                duration: BorrowDuration::Forever,
                price: Amount::new(40.0),
            },
        ],
    }
    .into_book();
    app.books.insert(book.clone()).await.unwrap();
    book
}

async fn send(router: axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn get(router: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(
        router,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn post_json(
    router: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(
        router,
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let (router, _) = setup();

    let (status, json) = get(router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (router, _) = setup();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_book() {
    let (router, _) = setup();

    let (status, json) = post_json(
        router,
        "/v1/books",
        serde_json::json!({
            "title": "The Left Hand of Darkness",
            "author": "Ursula K. Le Guin",
            "isbn": "978-0441478125",
            "prices": [{"duration": "1 month", "price": 8.0}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["slug"], "the-left-hand-of-darkness");
    assert!(json["data"]["id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_book_duplicate_isbn() {
    let (router, app) = setup();
    seed_book(&app, "Dune", "978-0441013593").await;

    let (status, json) = post_json(
        router,
        "/v1/books",
        serde_json::json!({
            "title": "Dune Again",
            "author": "Frank Herbert",
            "isbn": "978-0441013593",
            "prices": [{"duration": "1 month", "price": 8.0}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_create_book_without_prices() {
    let (router, _) = setup();

    let (status, _) = post_json(
        router,
        "/v1/books",
        serde_json::json!({
            "title": "Unpriced",
            "author": "Nobody",
            "isbn": "978-0000000000",
            "prices": []
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_book_bumps_access_counter() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;

    let (status, json) = get(router, &format!("/v1/books/{}", book.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["title"], "Dune");

    app.runner.run_pending().await;
    let stored = app.books.find(book.id).await.unwrap().unwrap();
    assert_eq!(stored.access_times, 1);
}

#[tokio::test]
async fn test_get_unknown_book() {
    let (router, _) = setup();

    let (status, json) = get(
        router,
        "/v1/books/00000000-0000-0000-0000-000000000000",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_get_book_malformed_id() {
    let (router, _) = setup();

    let (status, _) = get(router, "/v1/books/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_browse_books_with_search() {
    let (router, app) = setup();
    seed_book(&app, "Dune", "978-0441013593").await;
    seed_book(&app, "Hyperion", "978-0553283686").await;

    let (status, json) = get(router, "/v1/books?search=dune").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["results"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"]["results"][0]["title"], "Dune");
    assert_eq!(json["data"]["totalResults"], 1);
}

#[tokio::test]
async fn test_huge_page_numbers_return_empty_pages() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    let user_id = UserId::new();
    app.records
        .upsert_active(&EntitlementClaim {
            book_id: book.id,
            user_id,
            duration: BorrowDuration::OneMonth,
            price: Amount::new(10.0),
            pay_by: "manual".to_string(),
        })
        .await
        .unwrap();

    let (status, json) = get(router.clone(), "/v1/books?page=4294967295&limit=100").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["results"].as_array().unwrap().is_empty());
    assert_eq!(json["data"]["totalResults"], 1);

    let (status, json) = get(
        router,
        &format!("/v1/users/{user_id}/books?page=4294967295&limit=100"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_and_delete_book() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    let uri = format!("/v1/books/{}", book.id);

    let (status, json) = send(
        router.clone(),
        Request::builder()
            .method("PATCH")
            .uri(&uri)
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::to_string(&serde_json::json!({"title": "Dune Messiah"})).unwrap(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["slug"], "dune-messiah");

    let (status, _) = send(
        router.clone(),
        Request::builder()
            .method("DELETE")
            .uri(&uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(router, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_full_flow() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    let user_id = UserId::new();
    app.coupons
        .insert(Coupon::new("WELCOME10", 10))
        .await
        .unwrap();
    app.affiliates
        .insert(Affiliate::new(UserId::new(), "FRIEND25"))
        .await
        .unwrap();

    let (status, json) = post_json(
        router.clone(),
        "/v1/checkout",
        serde_json::json!({
            "user_id": user_id,
            "items": [{
                "book_id": book.id,
                "duration": "1 month",
                "price": 10.0,
                "refer_code": "FRIEND25",
                "coupon_code": "WELCOME10"
            }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let link = json["data"]["link"].as_str().unwrap();
    let payment_id = link.rsplit('/').next().unwrap().to_string();
    assert!(payment_id.starts_with("PAY-"));
    assert_eq!(app.gateway.payment_count(), 1);

    let (status, json) = get(
        router.clone(),
        &format!(
            "/v1/payments/success?paymentId={payment_id}&PayerID=PAYER-1&user_id={user_id}"
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(app.gateway.executed_count(), 1);

    // The entitlement lands synchronously, side effects via the queue.
    assert_eq!(app.records.record_count().await, 1);
    app.runner.run_pending().await;

    let coupon = app
        .coupons
        .find_by_code("WELCOME10")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon.used_by, vec![user_id]);
    assert_eq!(app.affiliates.commission_count().await, 1);

    let (status, json) = get(router, &format!("/v1/users/{user_id}/books")).await;
    assert_eq!(status, StatusCode::OK);
    let results = json["data"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["book"]["title"], "Dune");
    assert_eq!(results[0]["record"]["duration"], "1 month");
}

#[tokio::test]
async fn test_checkout_empty_selection() {
    let (router, _) = setup();

    let (status, json) = post_json(
        router,
        "/v1/checkout",
        serde_json::json!({ "user_id": UserId::new(), "items": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_checkout_unknown_book() {
    let (router, _) = setup();

    let (status, _) = post_json(
        router,
        "/v1/checkout",
        serde_json::json!({
            "user_id": UserId::new(),
            "items": [{
                "book_id": "00000000-0000-0000-0000-000000000000",
                "duration": "1 month",
                "price": 10.0
            }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_gateway_failure() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    app.gateway.set_fail_on_create(true);

    let (status, json) = post_json(
        router,
        "/v1/checkout",
        serde_json::json!({
            "user_id": UserId::new(),
            "items": [{ "book_id": book.id, "duration": "1 month", "price": 10.0 }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["status"], "error");
}

#[tokio::test]
async fn test_success_callback_with_unapproved_payment() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    let user_id = UserId::new();
    app.gateway.set_execute_state("pending");

    let (_, json) = post_json(
        router.clone(),
        "/v1/checkout",
        serde_json::json!({
            "user_id": user_id,
            "items": [{ "book_id": book.id, "duration": "1 month", "price": 10.0 }]
        }),
    )
    .await;
    let link = json["data"]["link"].as_str().unwrap();
    let payment_id = link.rsplit('/').next().unwrap();

    // The callback stays a neutral 200; no entitlement is granted.
    let (status, json) = get(
        router,
        &format!(
            "/v1/payments/success?paymentId={payment_id}&PayerID=PAYER-1&user_id={user_id}"
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(app.records.record_count().await, 0);
}

#[tokio::test]
async fn test_cancel_callback() {
    let (router, _) = setup();

    let (status, json) = get(router, "/v1/payments/cancel").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
}

#[tokio::test]
async fn test_manual_grant_and_record_listing() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    let user_id = UserId::new();

    let (status, json) = post_json(
        router.clone(),
        "/v1/records",
        serde_json::json!({
            "book_id": book.id,
            "user_id": user_id,
            "duration": "forever"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["is_bought"], true);
    assert_eq!(json["data"]["pay_by"], "manual");
    let record_id = json["data"]["id"].as_str().unwrap().to_string();

    let (status, json) = get(
        router.clone(),
        &format!("/v1/records?user_id={user_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["results"].as_array().unwrap().len(), 1);

    let (status, json) = get(router, &format!("/v1/records/{record_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], record_id.as_str());
}

#[tokio::test]
async fn test_manual_grant_unknown_book() {
    let (router, _) = setup();

    let (status, _) = post_json(
        router,
        "/v1/records",
        serde_json::json!({
            "book_id": "00000000-0000-0000-0000-000000000000",
            "user_id": UserId::new(),
            "duration": "1 month"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_add_list_and_remove() {
    let (router, app) = setup();
    let book = seed_book(&app, "Dune", "978-0441013593").await;
    let user_id = UserId::new();

    let (status, _) = post_json(
        router.clone(),
        "/v1/carts",
        serde_json::json!({ "user_id": user_id, "book_id": book.id }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // The line only appears once the queued job runs.
    assert_eq!(app.carts.item_count().await, 0);
    app.runner.run_pending().await;
    assert_eq!(app.carts.item_count().await, 1);

    let (status, json) = get(router.clone(), &format!("/v1/carts?user_id={user_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let lines = json["data"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    let line_id = lines[0]["id"].as_str().unwrap();

    let (status, _) = send(
        router,
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/carts/{line_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.carts.item_count().await, 0);
}

#[tokio::test]
async fn test_cart_add_unknown_book() {
    let (router, _) = setup();

    let (status, _) = post_json(
        router,
        "/v1/carts",
        serde_json::json!({
            "user_id": UserId::new(),
            "book_id": "00000000-0000-0000-0000-000000000000"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
