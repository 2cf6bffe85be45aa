//! Persistence for the storefront.
//!
//! # Tables
//!
//! - `products` - Catalog
//! - `profiles` / `user_passwords` - Accounts and argon2 password hashes
//! - `managed_users` - Admin view of accounts
//! - `cart_items` - Persisted cart lines, one per (user, product)
//! - `orders` / `order_items` - Orders with price snapshots
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! Handlers and services talk to the [`Backend`] trait. [`PgBackend`] is the
//! production implementation; [`MemoryBackend`] backs the test suites.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p shopkeep-cli -- migrate
//! ```

pub mod cart;
pub mod memory;
pub mod orders;
pub mod postgres;
pub mod products;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use shopkeep_core::cart::CartLine;
use shopkeep_core::{Email, OrderId, OrderStatus, ProductId, Role, UserId};

pub use memory::{MemoryBackend, Operation};
pub use postgres::PgBackend;

use crate::models::{
    Credentials, ManagedUser, NewAccount, NewOrder, NewProduct, Order, OrderWithItems, Product,
    ProductUpdate, Profile,
};
use crate::services::realtime::{OrderStatusChanged, OrderStatusSubscription};

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value failed validation on the way out.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The row does not exist.
    #[error("not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique violation to `Conflict`, anything else to `Database`.
    pub(crate) fn from_insert(err: sqlx::Error, conflict: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(conflict.to_owned());
        }
        Self::Database(err)
    }

    /// Map a foreign key violation to `fk`, anything else to `Database`.
    pub(crate) fn from_reference(err: sqlx::Error, fk: Self) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_foreign_key_violation()
        {
            return fk;
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// The storefront's data backend.
///
/// Every durable read and write goes through this trait so the HTTP layer can
/// run against Postgres in production and an in-memory store in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    // Products
    /// Newest products first.
    async fn list_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError>;
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;
    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError>;
    /// `Conflict` when order items still reference the product.
    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    // Profiles
    /// Create a profile, its password row and its managed-user row together.
    async fn create_account(&self, account: NewAccount) -> Result<Profile, RepositoryError>;
    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, RepositoryError>;
    /// Fresh role lookup. `NotFound` when the profile is gone.
    async fn get_role(&self, id: UserId) -> Result<Role, RepositoryError>;
    async fn get_credentials(&self, email: &Email)
    -> Result<Option<Credentials>, RepositoryError>;
    async fn set_role(&self, email: &Email, role: Role) -> Result<(), RepositoryError>;

    // Managed users
    /// Newest accounts first.
    async fn list_managed_users(&self) -> Result<Vec<ManagedUser>, RepositoryError>;
    /// Delete the managed-user row and the profile together.
    async fn delete_user(&self, id: UserId) -> Result<(), RepositoryError>;

    // Cart
    async fn list_cart(&self, user: UserId) -> Result<Vec<CartLine>, RepositoryError>;
    /// Insert or overwrite the line for (user, product).
    async fn upsert_cart_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError>;
    async fn delete_cart_item(&self, user: UserId, product: ProductId)
    -> Result<(), RepositoryError>;
    async fn clear_cart(&self, user: UserId) -> Result<(), RepositoryError>;

    // Orders
    /// Insert the order and all of its items as one unit.
    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;
    /// A user's orders with items, newest first.
    async fn list_orders_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<OrderWithItems>, RepositoryError>;
    /// All orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError>;
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChanged, RepositoryError>;

    // Push
    fn subscribe_order_updates(&self) -> OrderStatusSubscription;
}
