//! Admin dashboard route handlers.
//!
//! Every handler here runs behind [`require_admin`](crate::middleware::require_admin),
//! which puts the signed-in admin into the request extensions.

use std::convert::Infallible;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Extension, Form,
    extract::{Multipart, Path, Query, State},
    response::{
        IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shopkeep_core::{OrderId, OrderStatus, ProductId, UserId};

use super::{Layout, MessageQuery, with_error, with_notice};
use crate::error::AppError;
use crate::models::{CurrentUser, ManagedUser, Order, Product};
use crate::services::admin::{AdminError, Dashboard, ImageUpload, OrderBoard, ProductDraft, Section};
use crate::state::AppState;

const ADMIN_PATH: &str = "/admin";

/// Largest accepted product form body, image included.
pub const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// SSE event name for order status changes.
pub const ORDER_STATUS_EVENT: &str = "order-status";

// =============================================================================
// View Types
// =============================================================================

/// User row for the dashboard.
#[derive(Clone)]
pub struct UserRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub status: String,
    pub joined: String,
    pub is_self: bool,
}

impl UserRow {
    fn new(user: &ManagedUser, admin: &CurrentUser) -> Self {
        Self {
            id: user.id.to_string(),
            full_name: user.full_name.clone(),
            email: user.email.to_string(),
            status: user.status.as_str().to_owned(),
            joined: user.created_at.format("%Y-%m-%d").to_string(),
            is_self: user.id == admin.id,
        }
    }
}

/// Product row for the dashboard.
#[derive(Clone)]
pub struct ProductRow {
    pub id: String,
    pub name: String,
    pub price: String,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
}

impl From<&Product> for ProductRow {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            price: product.price.to_string(),
            stock_quantity: product.stock_quantity,
            image_url: product.image_url.clone(),
        }
    }
}

/// One entry of an order's status picker.
#[derive(Clone)]
pub struct StatusOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

fn status_options(current: OrderStatus) -> Vec<StatusOption> {
    OrderStatus::ALL
        .iter()
        .map(|status| StatusOption {
            value: status.as_str(),
            label: status.label(),
            selected: *status == current,
        })
        .collect()
}

/// Order row for the dashboard.
#[derive(Clone)]
pub struct OrderRow {
    pub id: String,
    pub customer: String,
    pub total: String,
    pub payment_method: String,
    pub placed_on: String,
    pub status: String,
    pub status_label: String,
    pub options: Vec<StatusOption>,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            customer: order.user_id.to_string(),
            total: order.total_amount.to_string(),
            payment_method: order.payment_method.clone(),
            placed_on: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
            status: order.status.as_str().to_owned(),
            status_label: order.status.label().to_owned(),
            options: status_options(order.status),
        }
    }
}

/// Product form values.
#[derive(Clone, Default)]
pub struct ProductFormView {
    pub name: String,
    pub description: String,
    pub price: String,
    pub stock_quantity: String,
    pub image_url: String,
}

impl From<&Product> for ProductFormView {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price.amount().to_string(),
            stock_quantity: product.stock_quantity.to_string(),
            image_url: product.image_url.clone().unwrap_or_default(),
        }
    }
}

/// Payload of an [`ORDER_STATUS_EVENT`].
#[derive(Debug, Serialize)]
pub struct OrderStatusPayload {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub label: &'static str,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Order> for OrderStatusPayload {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            label: order.status.label(),
            updated_at: order.updated_at,
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Admin dashboard template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub layout: Layout,
    pub users: Vec<UserRow>,
    pub users_error: Option<String>,
    pub products: Vec<ProductRow>,
    pub products_error: Option<String>,
    pub orders: Vec<OrderRow>,
    pub orders_error: Option<String>,
}

/// New/edit product form template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/product_form.html")]
pub struct ProductFormTemplate {
    pub layout: Layout,
    pub heading: String,
    pub action: String,
    pub form: ProductFormView,
}

// =============================================================================
// Helpers
// =============================================================================

fn rows<T, R>(section: &Section<T>, row: impl Fn(&T) -> R) -> (Vec<R>, Option<String>) {
    (section.items.iter().map(row).collect(), section.error.clone())
}

/// Message shown for an admin failure. Internal errors stay in the logs.
fn failure_message(err: &AdminError) -> String {
    if err.is_user_facing() {
        err.to_string()
    } else {
        tracing::error!(error = %err, "Admin operation failed");
        "Something went wrong. Please try again.".to_owned()
    }
}

/// Read the product form. Text fields are UTF-8; `image` is an optional file.
async fn read_draft(mut multipart: Multipart) -> Result<ProductDraft, String> {
    let mut draft = ProductDraft::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Failed to read form: {e}"))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("Failed to read image: {e}"))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                draft.upload = Some(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| format!("Failed to read {name}: {e}"))?;
        match name.as_str() {
            "name" => draft.name = value,
            "description" => draft.description = value,
            "price" => draft.price = value,
            "stock_quantity" => draft.stock_quantity = value,
            "image_url" => draft.image_url = value,
            _ => {}
        }
    }

    Ok(draft)
}

// =============================================================================
// Dashboard
// =============================================================================

/// Old dashboard path.
pub async fn legacy_redirect() -> Redirect {
    Redirect::permanent(ADMIN_PATH)
}

/// Display the dashboard. A failing section shows its own message.
#[instrument(skip(state, admin, messages), fields(admin_id = %admin.id))]
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Query(messages): Query<MessageQuery>,
) -> impl IntoResponse {
    let (layout, dashboard) = tokio::join!(
        Layout::load(&state, Some(&admin), messages),
        Dashboard::load(state.backend()),
    );

    let (users, users_error) = rows(&dashboard.users, |u| UserRow::new(u, &admin));
    let (products, products_error) = rows(&dashboard.products, |p| ProductRow::from(p));
    let (orders, orders_error) = rows(&dashboard.orders, |o| OrderRow::from(o));

    DashboardTemplate {
        layout,
        users,
        users_error,
        products,
        products_error,
        orders,
        orders_error,
    }
}

// =============================================================================
// Users
// =============================================================================

/// Delete a user account.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(id): Path<UserId>,
) -> Response {
    if id == admin.id {
        return with_error(ADMIN_PATH, "You cannot delete your own account.").into_response();
    }

    match state.admin().delete_user(id).await {
        Ok(()) => with_notice(ADMIN_PATH, "User deleted.").into_response(),
        Err(AdminError::NotFound) => with_error(ADMIN_PATH, "User not found.").into_response(),
        Err(e) => with_error(ADMIN_PATH, &failure_message(&e)).into_response(),
    }
}

// =============================================================================
// Products
// =============================================================================

/// Display the new product form.
pub async fn new_product(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Query(messages): Query<MessageQuery>,
) -> impl IntoResponse {
    ProductFormTemplate {
        layout: Layout::load(&state, Some(&admin), messages).await,
        heading: "New product".to_owned(),
        action: format!("{ADMIN_PATH}/products"),
        form: ProductFormView::default(),
    }
}

/// Create a product from the multipart form.
#[instrument(skip(state, multipart))]
pub async fn create_product(State(state): State<AppState>, multipart: Multipart) -> Response {
    let retry = format!("{ADMIN_PATH}/products/new");
    let draft = match read_draft(multipart).await {
        Ok(draft) => draft,
        Err(message) => return with_error(&retry, &message).into_response(),
    };

    match state.admin().create_product(draft).await {
        Ok(product) => {
            with_notice(ADMIN_PATH, &format!("Created {}.", product.name)).into_response()
        }
        Err(e) => with_error(&retry, &failure_message(&e)).into_response(),
    }
}

/// Display the edit form for a product.
#[instrument(skip(state, admin, messages))]
pub async fn edit_product(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(id): Path<ProductId>,
    Query(messages): Query<MessageQuery>,
) -> Result<Response, AppError> {
    let Some(product) = state.backend().get_product(id).await? else {
        return Ok(with_error(ADMIN_PATH, "Product not found.").into_response());
    };

    Ok(ProductFormTemplate {
        layout: Layout::load(&state, Some(&admin), messages).await,
        heading: format!("Edit {}", product.name),
        action: format!("{ADMIN_PATH}/products/{id}"),
        form: ProductFormView::from(&product),
    }
    .into_response())
}

/// Update a product from the multipart form.
#[instrument(skip(state, multipart))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
    multipart: Multipart,
) -> Response {
    let retry = format!("{ADMIN_PATH}/products/{id}/edit");
    let draft = match read_draft(multipart).await {
        Ok(draft) => draft,
        Err(message) => return with_error(&retry, &message).into_response(),
    };

    match state.admin().update_product(id, draft).await {
        Ok(product) => {
            with_notice(ADMIN_PATH, &format!("Saved {}.", product.name)).into_response()
        }
        Err(AdminError::NotFound) => with_error(ADMIN_PATH, "Product not found.").into_response(),
        Err(e) => with_error(&retry, &failure_message(&e)).into_response(),
    }
}

/// Delete a product and its uploaded image.
#[instrument(skip(state))]
pub async fn delete_product(State(state): State<AppState>, Path(id): Path<ProductId>) -> Response {
    match state.admin().delete_product(id).await {
        Ok(()) => with_notice(ADMIN_PATH, "Product deleted.").into_response(),
        Err(AdminError::NotFound) => with_error(ADMIN_PATH, "Product not found.").into_response(),
        Err(AdminError::Conflict(_)) => with_error(
            ADMIN_PATH,
            "This product appears in orders and cannot be deleted.",
        )
        .into_response(),
        Err(e) => with_error(ADMIN_PATH, &failure_message(&e)).into_response(),
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order status form data.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Change an order's status.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(id): Path<OrderId>,
    Form(form): Form<StatusForm>,
) -> Response {
    let Ok(status) = form.status.parse::<OrderStatus>() else {
        return with_error(ADMIN_PATH, "Unknown order status.").into_response();
    };

    match state.admin().update_order_status(admin.id, id, status).await {
        Ok(changed) => with_notice(
            ADMIN_PATH,
            &format!("Order marked {}.", changed.status.label()),
        )
        .into_response(),
        Err(AdminError::Forbidden) => Redirect::to("/").into_response(),
        Err(AdminError::NotFound) => with_error(ADMIN_PATH, "Order not found.").into_response(),
        Err(e) => with_error(ADMIN_PATH, &failure_message(&e)).into_response(),
    }
}

/// Stream order status changes for orders on the board.
///
/// The subscription is taken before the board is loaded so no change made
/// in between is missed. Changes to orders placed after the page loaded are
/// skipped; the page picks those up on reload.
#[instrument(skip(state))]
pub async fn order_events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state.backend().subscribe_order_updates();
    let mut board = OrderBoard::new(state.backend().list_orders().await?);

    let stream = subscription.into_stream().filter_map(move |change| {
        let event = board.apply(&change).map(|order| {
            let payload = OrderStatusPayload::from(order);
            let json = serde_json::to_string(&payload).unwrap_or_else(|_| {
                r#"{"type":"error","message":"Failed to serialize event"}"#.to_owned()
            });
            Ok(Event::default().event(ORDER_STATUS_EVENT).data(json))
        });
        futures::future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_options_mark_current() {
        let options = status_options(OrderStatus::Processing);
        assert_eq!(options.len(), OrderStatus::ALL.len());
        let selected: Vec<_> = options.iter().filter(|o| o.selected).collect();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.first().map(|o| o.value), Some("processing"));
    }

    #[test]
    fn test_failure_message_hides_backend_errors() {
        let err = AdminError::Backend(crate::db::RepositoryError::NotFound);
        assert_eq!(failure_message(&err), "Something went wrong. Please try again.");
        let err = AdminError::Invalid("product name is required".to_owned());
        assert_eq!(failure_message(&err), "product name is required");
    }
}
