//! Catalog, product pages and account flows.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;

use shopkeep_integration_tests::{PASSWORD, TestApp, location, redirects_to};
use shopkeep_storefront::db::Operation;

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let response = app.get(&client, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");

    let response = app.get(&client, "/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);

    app.backend.fail_next(Operation::Ping).await;
    let response = app.get(&client, "/health/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_catalog_lists_products_with_prices() {
    let app = TestApp::spawn().await;
    app.seed_product("Enamel Mug", "12.50", 4).await;
    app.seed_product("Loose Leaf Tea", "8", 0).await;

    let response = app.get(&TestApp::client(), "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Enamel Mug"));
    assert!(body.contains("$12.50"));
    assert!(body.contains("Loose Leaf Tea"));
    assert!(body.contains("$8.00"));
}

#[tokio::test]
async fn test_catalog_failure_shows_banner() {
    let app = TestApp::spawn().await;
    app.backend.fail_next(Operation::ListProducts).await;

    let response = app.get(&TestApp::client(), "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Could not load products. Please try again."));
}

#[tokio::test]
async fn test_product_page_and_missing_product() {
    let app = TestApp::spawn().await;
    let mug = app.seed_product("Enamel Mug", "12.50", 4).await;
    let client = TestApp::client();

    let response = app.get(&client, &format!("/products/{}", mug.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Enamel Mug description"));

    let missing = shopkeep_core::ProductId::new_v4();
    let response = app.get(&client, &format!("/products/{missing}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_listing_is_cached_until_invalidated() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    app.get(&client, "/").await;
    app.seed_product("Late Arrival", "3", 1).await;

    let body = app.get(&client, "/").await.text().await.unwrap();
    assert!(!body.contains("Late Arrival"), "listing should come from cache");
    assert_eq!(app.backend.call_count(Operation::ListProducts).await, 1);

    app.state.catalog().invalidate().await;
    let body = app.get(&client, "/").await.text().await.unwrap();
    assert!(body.contains("Late Arrival"));
}

#[tokio::test]
async fn test_register_login_logout() {
    let app = TestApp::spawn().await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;

    let body = app.get(&shopper.client, "/").await.text().await.unwrap();
    assert!(body.contains("Ada Lovelace"));

    let response = app.post_form(&shopper.client, "/logout", &[]).await;
    assert!(redirects_to(&response, "/"));
    let body = app.get(&shopper.client, "/").await.text().await.unwrap();
    assert!(!body.contains("Ada Lovelace"));

    let response = app
        .post_form(
            &shopper.client,
            "/login",
            &[("email", "ada@example.com"), ("password", "wrong password")],
        )
        .await;
    assert!(redirects_to(&response, "/login"));
    assert!(location(&response).contains("error="));

    let response = app
        .post_form(
            &shopper.client,
            "/login",
            &[("email", "ADA@example.com"), ("password", PASSWORD)],
        )
        .await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_register_rejects_mismatched_passwords_and_duplicates() {
    let app = TestApp::spawn().await;
    let client = TestApp::client();

    let response = app
        .post_form(
            &client,
            "/register",
            &[
                ("email", "grace@example.com"),
                ("full_name", "Grace Hopper"),
                ("password", PASSWORD),
                ("password_confirm", "something else"),
            ],
        )
        .await;
    assert!(redirects_to(&response, "/register"));
    assert_eq!(app.backend.call_count(Operation::CreateAccount).await, 0);

    app.register("grace@example.com", "Grace Hopper").await;
    let response = app
        .post_form(
            &client,
            "/register",
            &[
                ("email", "grace@example.com"),
                ("full_name", "Grace Again"),
                ("password", PASSWORD),
                ("password_confirm", PASSWORD),
            ],
        )
        .await;
    assert!(redirects_to(&response, "/register"));
    assert!(location(&response).contains("error="));
}

#[tokio::test]
async fn test_signed_in_user_skips_login_page() {
    let app = TestApp::spawn().await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;

    let response = app.get(&shopper.client, "/login").await;
    assert_eq!(location(&response), "/");

    let response = app.get(&TestApp::client(), "/login").await;
    assert_eq!(response.status(), StatusCode::OK);
}
