//! Admin dashboard, product management and pushed order status.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};

use shopkeep_core::{OrderId, OrderStatus};
use shopkeep_integration_tests::{Shopper, TestApp, location, redirects_to};
use shopkeep_storefront::db::{Backend, Operation};

/// Have `shopper` buy one of a fresh product and return the order id.
async fn place_order(app: &TestApp, shopper: &Shopper) -> OrderId {
    let product = app.seed_product("Enamel Mug", "12.50", 4).await;
    app.post_form(
        &shopper.client,
        "/cart/add",
        &[("product_id", &product.id.to_string())],
    )
    .await;
    let response = app
        .post_form(
            &shopper.client,
            "/checkout",
            &[
                ("street", "1 Main St"),
                ("city", "Springfield"),
                ("state", "IL"),
                ("zip", "62701"),
                ("card_number", "4111 1111 1111 1111"),
                ("expiry", "12/40"),
                ("cvc", "123"),
            ],
        )
        .await;
    assert!(redirects_to(&response, "/orders"));
    app.backend.list_orders_for_user(shopper.id).await.unwrap()[0]
        .order
        .id
}

#[tokio::test]
async fn test_guard_turns_away_visitors_and_shoppers() {
    let app = TestApp::spawn().await;

    let response = app.get(&TestApp::client(), "/admin").await;
    assert!(redirects_to(&response, "/login"));

    let shopper = app.register("ada@example.com", "Ada Lovelace").await;
    let response = app.get(&shopper.client, "/admin").await;
    assert_eq!(location(&response), "/");

    let response = app
        .post_form(&shopper.client, "/admin/products", &[])
        .await;
    assert_eq!(location(&response), "/");
    assert_eq!(app.backend.call_count(Operation::CreateProduct).await, 0);
}

#[tokio::test]
async fn test_guard_rereads_role_on_every_request() {
    let app = TestApp::spawn().await;
    let admin = app.register_admin("root@example.com").await;

    let response = app.get(&admin.client, "/admin").await;
    assert_eq!(response.status(), StatusCode::OK);

    app.backend
        .set_role(&admin.email, shopkeep_core::Role::Normal)
        .await
        .unwrap();
    let response = app.get(&admin.client, "/admin").await;
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_legacy_dashboard_path_redirects() {
    let app = TestApp::spawn().await;
    let response = app.get(&TestApp::client(), "/admin-dashboard").await;
    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "/admin");
}

#[tokio::test]
async fn test_dashboard_lists_all_sections() {
    let app = TestApp::spawn().await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;
    place_order(&app, &shopper).await;
    let admin = app.register_admin("root@example.com").await;

    let response = app.get(&admin.client, "/admin").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("ada@example.com"));
    assert!(body.contains("Enamel Mug"));
    assert!(body.contains("data-order-id"));
    assert!(body.contains("Pending"));
}

#[tokio::test]
async fn test_dashboard_section_failure_is_isolated() {
    let app = TestApp::spawn().await;
    app.seed_product("Enamel Mug", "12.50", 4).await;
    let admin = app.register_admin("root@example.com").await;

    app.backend.fail_next(Operation::ListOrders).await;
    let response = app.get(&admin.client, "/admin").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("Could not load orders."));
    assert!(body.contains("Enamel Mug"));
    assert!(body.contains("root@example.com"));
}

#[tokio::test]
async fn test_create_product_with_uploaded_image() {
    let app = TestApp::spawn().await;
    let admin = app.register_admin("root@example.com").await;

    // Cache the empty listing first.
    app.get(&admin.client, "/").await;

    let form = Form::new()
        .text("name", "Copper Kettle")
        .text("description", "Whistles.")
        .text("price", "45.00")
        .text("stock_quantity", "3")
        .part(
            "image",
            Part::bytes(b"\x89PNG fake".to_vec())
                .file_name("kettle.png")
                .mime_str("image/png")
                .unwrap(),
        );
    let response = admin
        .client
        .post(app.url("/admin/products"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert!(redirects_to(&response, "/admin"));
    assert!(location(&response).contains("notice="));

    let products = app.backend.list_products(10).await.unwrap();
    assert_eq!(products.len(), 1);
    let key = products[0].image_key.clone().unwrap();
    assert!(app.images.contains(&key).await);

    let body = app.get(&admin.client, "/").await.text().await.unwrap();
    assert!(body.contains("Copper Kettle"), "creation should refresh the listing");
}

#[tokio::test]
async fn test_invalid_product_is_not_saved() {
    let app = TestApp::spawn().await;
    let admin = app.register_admin("root@example.com").await;

    let form = Form::new()
        .text("name", "")
        .text("description", "Nameless")
        .text("price", "-1")
        .text("stock_quantity", "3");
    let response = admin
        .client
        .post(app.url("/admin/products"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert!(redirects_to(&response, "/admin/products/new"));
    assert_eq!(app.backend.call_count(Operation::CreateProduct).await, 0);
    assert!(app.images.is_empty().await);
}

#[tokio::test]
async fn test_ordered_product_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;
    place_order(&app, &shopper).await;
    let admin = app.register_admin("root@example.com").await;
    let product = app.backend.list_products(10).await.unwrap().remove(0);

    let response = app
        .post_form(
            &admin.client,
            &format!("/admin/products/{}/delete", product.id),
            &[],
        )
        .await;
    assert!(redirects_to(&response, "/admin"));
    assert!(location(&response).contains("error="));
    assert!(app.backend.get_product(product.id).await.unwrap().is_some());

    let spare = app.seed_product("Spare Lid", "2", 1).await;
    let response = app
        .post_form(
            &admin.client,
            &format!("/admin/products/{}/delete", spare.id),
            &[],
        )
        .await;
    assert!(location(&response).contains("notice="));
    assert!(app.backend.get_product(spare.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let app = TestApp::spawn().await;
    let admin = app.register_admin("root@example.com").await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;

    let response = app
        .post_form(&admin.client, &format!("/admin/users/{}/delete", admin.id), &[])
        .await;
    assert!(location(&response).contains("error="));
    assert!(app.backend.get_profile(admin.id).await.unwrap().is_some());

    let response = app
        .post_form(
            &admin.client,
            &format!("/admin/users/{}/delete", shopper.id),
            &[],
        )
        .await;
    assert!(location(&response).contains("notice="));
    assert!(app.backend.get_profile(shopper.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_status_change_is_pushed_to_dashboard_stream() {
    let app = TestApp::spawn().await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;
    let order_id = place_order(&app, &shopper).await;
    let admin = app.register_admin("root@example.com").await;

    let events = app.get(&admin.client, "/admin/orders/events").await;
    assert_eq!(events.status(), StatusCode::OK);
    assert_eq!(
        events.headers()[reqwest::header::CONTENT_TYPE],
        "text/event-stream"
    );
    let mut stream = events.bytes_stream();

    let response = app
        .post_form(
            &admin.client,
            &format!("/admin/orders/{order_id}/status"),
            &[("status", "processing")],
        )
        .await;
    assert!(location(&response).contains("notice="));

    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !received.contains("\n\n") {
            let chunk = stream.next().await.unwrap().unwrap();
            received.push_str(&String::from_utf8_lossy(&chunk));
        }
    })
    .await
    .expect("status event should arrive");

    assert!(received.contains("event: order-status"));
    let data = received
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let payload: serde_json::Value = serde_json::from_str(data).unwrap();
    assert_eq!(payload["order_id"], order_id.to_string());
    assert_eq!(payload["status"], "processing");
    assert_eq!(payload["label"], "Processing");

    let orders = app.backend.list_orders().await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Processing);
}

#[tokio::test]
async fn test_unknown_status_is_rejected() {
    let app = TestApp::spawn().await;
    let shopper = app.register("ada@example.com", "Ada Lovelace").await;
    let order_id = place_order(&app, &shopper).await;
    let admin = app.register_admin("root@example.com").await;

    let response = app
        .post_form(
            &admin.client,
            &format!("/admin/orders/{order_id}/status"),
            &[("status", "teleported")],
        )
        .await;
    assert!(location(&response).contains("error="));
    assert_eq!(app.backend.call_count(Operation::UpdateOrderStatus).await, 0);
}
