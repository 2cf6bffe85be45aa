//! Order history route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::instrument;

use super::{Layout, MessageQuery};
use crate::middleware::RequireAuth;
use crate::models::{OrderItem, OrderWithItems};
use crate::state::AppState;

/// Order line display data for templates.
#[derive(Clone)]
pub struct OrderItemView {
    pub name: String,
    pub quantity: i32,
    pub price: String,
    pub line_price: String,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            name: item.product_name.clone(),
            quantity: item.quantity,
            price: item.price_at_time.to_string(),
            line_price: item.subtotal().to_string(),
        }
    }
}

/// Order display data for templates.
#[derive(Clone)]
pub struct OrderView {
    pub id: String,
    pub placed_on: String,
    pub status: String,
    pub status_label: String,
    pub total: String,
    pub payment_method: String,
    pub ship_to: String,
    pub items: Vec<OrderItemView>,
}

impl From<&OrderWithItems> for OrderView {
    fn from(entry: &OrderWithItems) -> Self {
        let order = &entry.order;
        let shipping = &order.shipping;
        Self {
            id: order.id.to_string(),
            placed_on: order.created_at.format("%B %-d, %Y").to_string(),
            status: order.status.as_str().to_owned(),
            status_label: order.status.label().to_owned(),
            total: order.total_amount.to_string(),
            payment_method: order.payment_method.clone(),
            ship_to: format!(
                "{}, {}, {} {}",
                shipping.street, shipping.city, shipping.state, shipping.zip
            ),
            items: entry.items.iter().map(OrderItemView::from).collect(),
        }
    }
}

/// Order history template.
#[derive(Template, WebTemplate)]
#[template(path = "orders.html")]
pub struct OrdersTemplate {
    pub layout: Layout,
    pub orders: Vec<OrderView>,
}

/// Display the signed-in shopper's orders, newest first.
#[instrument(skip(state, user, messages), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(messages): Query<MessageQuery>,
) -> impl IntoResponse {
    let mut layout = Layout::load(&state, Some(&user), messages).await;

    let orders = match state.backend().list_orders_for_user(user.id).await {
        Ok(orders) => orders.iter().map(OrderView::from).collect(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load order history");
            layout.fail("Could not load your orders. Please try again.");
            Vec::new()
        }
    };

    OrdersTemplate { layout, orders }
}
