//! `PostgreSQL` backend.
//!
//! Delegates to the per-table repositories. Order status pushes come from the
//! `orders` trigger through `LISTEN order_status`, so updates made by any
//! writer (including the CLI or a SQL console) reach subscribers.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;

use shopkeep_core::cart::CartLine;
use shopkeep_core::{Email, OrderId, OrderStatus, ProductId, Role, UserId};

use super::cart::CartRepository;
use super::orders::OrderRepository;
use super::products::ProductRepository;
use super::users::UserRepository;
use super::{Backend, RepositoryError};
use crate::models::{
    Credentials, ManagedUser, NewAccount, NewOrder, NewProduct, Order, OrderWithItems, Product,
    ProductUpdate, Profile,
};
use crate::services::realtime::{OrderEvents, OrderStatusChanged, OrderStatusSubscription};

/// Notification channel written by the `orders_notify_status` trigger.
pub const ORDER_STATUS_CHANNEL: &str = "order_status";

/// Backend over a `PostgreSQL` pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
    events: OrderEvents,
}

impl PgBackend {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            events: OrderEvents::new(),
        }
    }

    /// The underlying pool, shared with the session store.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Start forwarding `order_status` notifications to subscribers.
    ///
    /// The task ends if the listener connection fails; it is not restarted.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the listener cannot connect or subscribe.
    pub async fn spawn_listener(&self) -> Result<JoinHandle<()>, sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(ORDER_STATUS_CHANNEL).await?;
        let events = self.events.clone();

        Ok(tokio::spawn(async move {
            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        match serde_json::from_str::<OrderStatusChanged>(notification.payload()) {
                            Ok(event) => {
                                let delivered = events.publish(event);
                                tracing::debug!(delivered, "Forwarded order status change");
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    payload = notification.payload(),
                                    "Malformed order status notification"
                                );
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Order status listener stopped");
                        break;
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).list(limit).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get(id).await
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).create(product).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).update(id, update).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        ProductRepository::new(&self.pool).delete(id).await
    }

    async fn create_account(&self, account: NewAccount) -> Result<Profile, RepositoryError> {
        UserRepository::new(&self.pool).create_account(account).await
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        UserRepository::new(&self.pool).get_profile(id).await
    }

    async fn get_role(&self, id: UserId) -> Result<Role, RepositoryError> {
        UserRepository::new(&self.pool).get_role(id).await
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<Credentials>, RepositoryError> {
        UserRepository::new(&self.pool).get_credentials(email).await
    }

    async fn set_role(&self, email: &Email, role: Role) -> Result<(), RepositoryError> {
        UserRepository::new(&self.pool).set_role(email, role).await
    }

    async fn list_managed_users(&self) -> Result<Vec<ManagedUser>, RepositoryError> {
        UserRepository::new(&self.pool).list_managed().await
    }

    async fn delete_user(&self, id: UserId) -> Result<(), RepositoryError> {
        UserRepository::new(&self.pool).delete(id).await
    }

    async fn list_cart(&self, user: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        CartRepository::new(&self.pool).list(user).await
    }

    async fn upsert_cart_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        CartRepository::new(&self.pool)
            .upsert(user, product, quantity)
            .await
    }

    async fn delete_cart_item(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<(), RepositoryError> {
        CartRepository::new(&self.pool).delete(user, product).await
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), RepositoryError> {
        CartRepository::new(&self.pool).clear(user).await
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        OrderRepository::new(&self.pool).create(order).await
    }

    async fn list_orders_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        OrderRepository::new(&self.pool).list_for_user(user).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).list().await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChanged, RepositoryError> {
        // Subscribers hear about this through the trigger.
        OrderRepository::new(&self.pool).update_status(id, status).await
    }

    fn subscribe_order_updates(&self) -> OrderStatusSubscription {
        self.events.subscribe()
    }
}
