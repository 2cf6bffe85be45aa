//! Order repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use shopkeep_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, ShippingAddress, UserId};

use super::RepositoryError;
use crate::models::{NewOrder, Order, OrderItem, OrderWithItems};
use crate::services::realtime::OrderStatusChanged;

const ORDER_COLUMNS: &str = "id, user_id, status, payment_method, shipping_street, \
     shipping_city, shipping_state, shipping_zip, total_amount, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    payment_method: String,
    shipping_street: String,
    shipping_city: String,
    shipping_state: String,
    shipping_zip: String,
    total_amount: Price,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            status: row.status,
            payment_method: row.payment_method,
            shipping: ShippingAddress {
                street: row.shipping_street,
                city: row.shipping_city,
                state: row.shipping_state,
                zip: row.shipping_zip,
            },
            total_amount: row.total_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    price_at_time: Price,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            price_at_time: row.price_at_time,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    id: OrderId,
    status: OrderStatus,
    updated_at: DateTime<Utc>,
}

/// Repository for orders and their items.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order and its items in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user or a product no longer exists.
    /// Returns `RepositoryError::Database` for other database errors. Nothing
    /// is written in either case.
    pub async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO orders (id, user_id, status, payment_method, shipping_street,
                                shipping_city, shipping_state, shipping_zip, total_amount)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(OrderId::new_v4())
        .bind(order.user_id)
        .bind(&order.payment_method)
        .bind(&order.shipping.street)
        .bind(&order.shipping.city)
        .bind(&order.shipping.state)
        .bind(&order.shipping.zip)
        .bind(order.total_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_reference(e, RepositoryError::NotFound))?;

        for item in &order.items {
            sqlx::query(
                r"
                INSERT INTO order_items (id, order_id, product_id, quantity, price_at_time)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(OrderItemId::new_v4())
            .bind(row.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price_at_time)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_reference(e, RepositoryError::NotFound))?;
        }

        tx.commit().await?;

        Ok(row.into())
    }

    /// A user's orders with their items, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list_for_user(&self, user: UserId) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let orders: Vec<Order> = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let items = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name,
                   oi.quantity, oi.price_at_time
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = ANY($1)
            ORDER BY p.name
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderItem::from(item));
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Order::from).collect())
    }

    /// Set an order's status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChanged, RepositoryError> {
        let row = sqlx::query_as::<_, StatusRow>(
            r"
            UPDATE orders SET status = $2, updated_at = now()
            WHERE id = $1
            RETURNING id, status, updated_at
            ",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(OrderStatusChanged {
            order_id: row.id,
            status: row.status,
            updated_at: row.updated_at,
        })
    }
}
