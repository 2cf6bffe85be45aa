//! Order domain types.
//!
//! Orders are immutable apart from their status. Items carry the price that
//! was charged, independent of later catalog changes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shopkeep_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, ShippingAddress, UserId};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_method: String,
    pub shipping: ShippingAddress,
    pub total_amount: Price,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Current product name, for display.
    pub product_name: String,
    pub quantity: i32,
    pub price_at_time: Price,
}

impl OrderItem {
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.price_at_time.times(self.quantity)
    }
}

/// An order together with its items, as shown in order history.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Input for order creation.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub payment_method: String,
    pub shipping: ShippingAddress,
    pub total_amount: Price,
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price_at_time: Price,
}
