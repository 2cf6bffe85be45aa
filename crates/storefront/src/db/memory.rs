//! In-process backend.
//!
//! Holds every table in memory behind one `RwLock` and honors the same
//! contract as [`PgBackend`](super::PgBackend): newest-first listings, the
//! cascade from users and products to cart lines, and the refusal to delete a
//! product that has been ordered. Used by unit and integration tests.
//!
//! Failure injection: [`MemoryBackend::fail_next`] makes the next call of one
//! operation return a database error. [`MemoryBackend::call_count`] reports
//! how often an operation was reached, so tests can assert that nothing was
//! written.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use shopkeep_core::cart::CartLine;
use shopkeep_core::{
    Email, OrderId, OrderItemId, OrderStatus, Price, ProductId, Role, UserId, UserStatus,
};

use super::{Backend, RepositoryError};
use crate::models::{
    Credentials, ManagedUser, NewAccount, NewOrder, NewProduct, Order, OrderItem, OrderWithItems,
    Product, ProductUpdate, Profile,
};
use crate::services::realtime::{OrderEvents, OrderStatusChanged, OrderStatusSubscription};

/// One [`Backend`] method, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ping,
    ListProducts,
    GetProduct,
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    CreateAccount,
    GetProfile,
    GetRole,
    GetCredentials,
    SetRole,
    ListManagedUsers,
    DeleteUser,
    ListCart,
    UpsertCartItem,
    DeleteCartItem,
    ClearCart,
    CreateOrder,
    ListOrdersForUser,
    ListOrders,
    UpdateOrderStatus,
}

#[derive(Debug, Clone)]
struct Account {
    profile: Profile,
    password_hash: String,
    managed: ManagedUser,
}

#[derive(Debug, Clone, Copy)]
struct StoredCartLine {
    user_id: UserId,
    product_id: ProductId,
    quantity: i32,
}

#[derive(Debug, Clone, Copy)]
struct StoredOrderItem {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price_at_time: Price,
}

/// Tables are kept in insertion order; listings reverse them for newest-first.
#[derive(Debug, Default)]
struct State {
    products: Vec<Product>,
    accounts: Vec<Account>,
    cart: Vec<StoredCartLine>,
    orders: Vec<Order>,
    order_items: Vec<StoredOrderItem>,
    pending_failures: HashMap<Operation, usize>,
    calls: HashMap<Operation, usize>,
}

impl State {
    /// Record a call and consume an injected failure, if any.
    fn enter(&mut self, op: Operation) -> Result<(), RepositoryError> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(pending) = self.pending_failures.get_mut(&op)
            && *pending > 0
        {
            *pending -= 1;
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn product(&self, id: ProductId) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    fn account(&self, id: UserId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.profile.id == id)
    }

    fn account_by_email(&self, email: &Email) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.profile.email == email)
    }
}

/// Backend over in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
    events: OrderEvents,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with a database error.
    pub async fn fail_next(&self, op: Operation) {
        *self
            .state
            .write()
            .await
            .pending_failures
            .entry(op)
            .or_default() += 1;
    }

    /// Number of times `op` has been called, including failed calls.
    pub async fn call_count(&self, op: Operation) -> usize {
        self.state
            .read()
            .await
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }

    /// Total number of calls to any write operation.
    pub async fn write_count(&self) -> usize {
        const WRITES: [Operation; 11] = [
            Operation::CreateProduct,
            Operation::UpdateProduct,
            Operation::DeleteProduct,
            Operation::CreateAccount,
            Operation::SetRole,
            Operation::DeleteUser,
            Operation::UpsertCartItem,
            Operation::DeleteCartItem,
            Operation::ClearCart,
            Operation::CreateOrder,
            Operation::UpdateOrderStatus,
        ];
        let state = self.state.read().await;
        WRITES
            .iter()
            .filter_map(|op| state.calls.get(op))
            .sum()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ping(&self) -> Result<(), RepositoryError> {
        self.state.write().await.enter(Operation::Ping)
    }

    async fn list_products(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::ListProducts)?;
        let limit = usize::try_from(limit).unwrap_or_default();
        Ok(state.products.iter().rev().take(limit).cloned().collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::GetProduct)?;
        Ok(state.product(id).cloned())
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::CreateProduct)?;
        let (image_url, image_key) = product
            .image
            .map_or((None, None), |image| (Some(image.url), image.key));
        let created = Product {
            id: ProductId::new_v4(),
            name: product.name,
            description: product.description,
            price: product.price,
            image_url,
            image_key,
            stock_quantity: product.stock_quantity,
            created_at: Utc::now(),
        };
        state.products.push(created.clone());
        Ok(created)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::UpdateProduct)?;
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RepositoryError::NotFound)?;
        product.name = update.name;
        product.description = update.description;
        product.price = update.price;
        product.stock_quantity = update.stock_quantity;
        if let Some(image) = update.image {
            product.image_url = Some(image.url);
            product.image_key = image.key;
        }
        Ok(product.clone())
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::DeleteProduct)?;
        if state.product(id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        if state.order_items.iter().any(|item| item.product_id == id) {
            return Err(RepositoryError::Conflict(
                "product has been ordered".to_owned(),
            ));
        }
        state.products.retain(|p| p.id != id);
        state.cart.retain(|line| line.product_id != id);
        Ok(())
    }

    async fn create_account(&self, account: NewAccount) -> Result<Profile, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::CreateAccount)?;
        if state.account_by_email(&account.email).is_some() {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = Utc::now();
        let profile = Profile {
            id: UserId::new_v4(),
            email: account.email.clone(),
            full_name: account.full_name.clone(),
            role: Role::Normal,
            address: None,
            created_at: now,
            updated_at: now,
        };
        state.accounts.push(Account {
            profile: profile.clone(),
            password_hash: account.password_hash,
            managed: ManagedUser {
                id: profile.id,
                full_name: account.full_name,
                email: account.email,
                status: UserStatus::Active,
                created_at: now,
            },
        });
        Ok(profile)
    }

    async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::GetProfile)?;
        Ok(state.account(id).map(|a| a.profile.clone()))
    }

    async fn get_role(&self, id: UserId) -> Result<Role, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::GetRole)?;
        state
            .account(id)
            .map(|a| a.profile.role)
            .ok_or(RepositoryError::NotFound)
    }

    async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<Credentials>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::GetCredentials)?;
        Ok(state.account_by_email(email).map(|a| Credentials {
            user_id: a.profile.id,
            email: a.profile.email.clone(),
            full_name: a.profile.full_name.clone(),
            password_hash: a.password_hash.clone(),
        }))
    }

    async fn set_role(&self, email: &Email, role: Role) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::SetRole)?;
        let account = state
            .accounts
            .iter_mut()
            .find(|a| &a.profile.email == email)
            .ok_or(RepositoryError::NotFound)?;
        account.profile.role = role;
        account.profile.updated_at = Utc::now();
        Ok(())
    }

    async fn list_managed_users(&self) -> Result<Vec<ManagedUser>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::ListManagedUsers)?;
        Ok(state
            .accounts
            .iter()
            .rev()
            .map(|a| a.managed.clone())
            .collect())
    }

    async fn delete_user(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::DeleteUser)?;
        if state.account(id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        let order_ids: Vec<OrderId> = state
            .orders
            .iter()
            .filter(|o| o.user_id == id)
            .map(|o| o.id)
            .collect();
        state.accounts.retain(|a| a.profile.id != id);
        state.cart.retain(|line| line.user_id != id);
        state.orders.retain(|o| o.user_id != id);
        state
            .order_items
            .retain(|item| !order_ids.contains(&item.order_id));
        Ok(())
    }

    async fn list_cart(&self, user: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::ListCart)?;
        Ok(state
            .cart
            .iter()
            .filter(|line| line.user_id == user)
            .filter_map(|line| {
                state.product(line.product_id).map(|p| CartLine {
                    product_id: p.id,
                    name: p.name.clone(),
                    price: p.price,
                    image_url: p.image_url.clone(),
                    quantity: line.quantity,
                })
            })
            .collect())
    }

    async fn upsert_cart_item(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::UpsertCartItem)?;
        if state.account(user).is_none() || state.product(product).is_none() {
            return Err(RepositoryError::NotFound);
        }
        if let Some(line) = state
            .cart
            .iter_mut()
            .find(|line| line.user_id == user && line.product_id == product)
        {
            line.quantity = quantity;
        } else {
            state.cart.push(StoredCartLine {
                user_id: user,
                product_id: product,
                quantity,
            });
        }
        Ok(())
    }

    async fn delete_cart_item(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::DeleteCartItem)?;
        state
            .cart
            .retain(|line| !(line.user_id == user && line.product_id == product));
        Ok(())
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::ClearCart)?;
        state.cart.retain(|line| line.user_id != user);
        Ok(())
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::CreateOrder)?;
        if state.account(order.user_id).is_none()
            || order
                .items
                .iter()
                .any(|item| state.product(item.product_id).is_none())
        {
            return Err(RepositoryError::NotFound);
        }

        let now = Utc::now();
        let created = Order {
            id: OrderId::new_v4(),
            user_id: order.user_id,
            status: OrderStatus::Pending,
            payment_method: order.payment_method,
            shipping: order.shipping,
            total_amount: order.total_amount,
            created_at: now,
            updated_at: now,
        };
        for item in order.items {
            state.order_items.push(StoredOrderItem {
                id: OrderItemId::new_v4(),
                order_id: created.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_time: item.price_at_time,
            });
        }
        state.orders.push(created.clone());
        Ok(created)
    }

    async fn list_orders_for_user(
        &self,
        user: UserId,
    ) -> Result<Vec<OrderWithItems>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::ListOrdersForUser)?;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user)
            .map(|order| {
                let mut items: Vec<OrderItem> = state
                    .order_items
                    .iter()
                    .filter(|item| item.order_id == order.id)
                    .filter_map(|item| {
                        state.product(item.product_id).map(|p| OrderItem {
                            id: item.id,
                            order_id: item.order_id,
                            product_id: item.product_id,
                            product_name: p.name.clone(),
                            quantity: item.quantity,
                            price_at_time: item.price_at_time,
                        })
                    })
                    .collect();
                items.sort_by(|a, b| a.product_name.cmp(&b.product_name));
                OrderWithItems {
                    order: order.clone(),
                    items,
                }
            })
            .collect())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let mut state = self.state.write().await;
        state.enter(Operation::ListOrders)?;
        Ok(state.orders.iter().rev().cloned().collect())
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChanged, RepositoryError> {
        let event = {
            let mut state = self.state.write().await;
            state.enter(Operation::UpdateOrderStatus)?;
            let order = state
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or(RepositoryError::NotFound)?;
            order.status = status;
            order.updated_at = Utc::now();
            OrderStatusChanged {
                order_id: order.id,
                status,
                updated_at: order.updated_at,
            }
        };
        self.events.publish(event.clone());
        Ok(event)
    }

    fn subscribe_order_updates(&self) -> OrderStatusSubscription {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shopkeep_core::ShippingAddress;

    use super::*;
    use crate::models::NewOrderItem;

    fn new_product(name: &str, cents: i64) -> NewProduct {
        NewProduct {
            name: name.to_owned(),
            description: String::new(),
            price: Price::from_cents(cents).unwrap(),
            stock_quantity: 5,
            image: None,
        }
    }

    async fn account(backend: &MemoryBackend, email: &str) -> Profile {
        backend
            .create_account(NewAccount {
                email: Email::parse(email).unwrap(),
                full_name: "Test User".to_owned(),
                password_hash: "hash".to_owned(),
            })
            .await
            .unwrap()
    }

    fn order_for(user: UserId, product: &Product) -> NewOrder {
        NewOrder {
            user_id: user,
            payment_method: "visa".to_owned(),
            shipping: ShippingAddress {
                street: "1 Main St".to_owned(),
                city: "Springfield".to_owned(),
                state: "IL".to_owned(),
                zip: "62701".to_owned(),
            },
            total_amount: product.price,
            items: vec![NewOrderItem {
                product_id: product.id,
                quantity: 1,
                price_at_time: product.price,
            }],
        }
    }

    #[tokio::test]
    async fn test_products_listed_newest_first() {
        let backend = MemoryBackend::new();
        backend.create_product(new_product("First", 100)).await.unwrap();
        backend.create_product(new_product("Second", 200)).await.unwrap();
        backend.create_product(new_product("Third", 300)).await.unwrap();

        let names: Vec<_> = backend
            .list_products(2)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["Third", "Second"]);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let backend = MemoryBackend::new();
        account(&backend, "dup@example.com").await;
        let err = backend
            .create_account(NewAccount {
                email: Email::parse("DUP@example.com").unwrap(),
                full_name: "Other".to_owned(),
                password_hash: "hash".to_owned(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_quantity() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "cart@example.com").await;
        let product = backend.create_product(new_product("Mug", 1200)).await.unwrap();

        backend.upsert_cart_item(user.id, product.id, 1).await.unwrap();
        backend.upsert_cart_item(user.id, product.id, 3).await.unwrap();

        let lines = backend.list_cart(user.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_upsert_unknown_product_is_not_found() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "cart@example.com").await;
        let err = backend
            .upsert_cart_item(user.id, ProductId::new_v4(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_ordered_product_cannot_be_deleted() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "buyer@example.com").await;
        let product = backend.create_product(new_product("Lamp", 4500)).await.unwrap();
        backend.create_order(order_for(user.id, &product)).await.unwrap();

        let err = backend.delete_product(product.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(backend.get_product(product.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_product_removes_cart_lines() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "cart@example.com").await;
        let product = backend.create_product(new_product("Mug", 1200)).await.unwrap();
        backend.upsert_cart_item(user.id, product.id, 2).await.unwrap();

        backend.delete_product(product.id).await.unwrap();
        assert!(backend.list_cart(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "gone@example.com").await;
        let product = backend.create_product(new_product("Lamp", 4500)).await.unwrap();
        backend.upsert_cart_item(user.id, product.id, 1).await.unwrap();
        backend.create_order(order_for(user.id, &product)).await.unwrap();

        backend.delete_user(user.id).await.unwrap();

        assert!(backend.get_profile(user.id).await.unwrap().is_none());
        assert!(backend.list_managed_users().await.unwrap().is_empty());
        assert!(backend.list_orders().await.unwrap().is_empty());
        // Product is free to delete once its only order is gone.
        backend.delete_product(product.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_order_with_missing_product_writes_nothing() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "buyer@example.com").await;
        let product = backend.create_product(new_product("Lamp", 4500)).await.unwrap();
        let mut order = order_for(user.id, &product);
        order.items.push(NewOrderItem {
            product_id: ProductId::new_v4(),
            quantity: 1,
            price_at_time: Price::ZERO,
        });

        let err = backend.create_order(order).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        assert!(backend.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_items_keep_price_snapshot() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "buyer@example.com").await;
        let product = backend.create_product(new_product("Lamp", 4500)).await.unwrap();
        backend.create_order(order_for(user.id, &product)).await.unwrap();

        backend
            .update_product(
                product.id,
                ProductUpdate {
                    name: "Desk Lamp".to_owned(),
                    description: String::new(),
                    price: Price::from_cents(9900).unwrap(),
                    stock_quantity: 1,
                    image: None,
                },
            )
            .await
            .unwrap();

        let history = backend.list_orders_for_user(user.id).await.unwrap();
        let item = &history[0].items[0];
        assert_eq!(item.product_name, "Desk Lamp");
        assert_eq!(item.price_at_time, Price::from_cents(4500).unwrap());
    }

    #[tokio::test]
    async fn test_status_update_is_published() {
        let backend = MemoryBackend::new();
        let user = account(&backend, "buyer@example.com").await;
        let product = backend.create_product(new_product("Lamp", 4500)).await.unwrap();
        let order = backend.create_order(order_for(user.id, &product)).await.unwrap();
        let mut subscription = backend.subscribe_order_updates();

        backend
            .update_order_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.order_id, order.id);
        assert_eq!(event.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_fail_next_fails_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(Operation::ListProducts).await;

        assert!(matches!(
            backend.list_products(10).await,
            Err(RepositoryError::Database(_))
        ));
        assert!(backend.list_products(10).await.is_ok());
        assert_eq!(backend.call_count(Operation::ListProducts).await, 2);
    }

    #[tokio::test]
    async fn test_write_count_ignores_reads() {
        let backend = MemoryBackend::new();
        backend.list_products(10).await.unwrap();
        backend.list_orders().await.unwrap();
        assert_eq!(backend.write_count().await, 0);

        backend.create_product(new_product("Mug", 1200)).await.unwrap();
        assert_eq!(backend.write_count().await, 1);
    }
}
