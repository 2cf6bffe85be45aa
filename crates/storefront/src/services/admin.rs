//! Admin dashboard operations.
//!
//! The dashboard is three independent sections. A failing section carries its
//! own error message and the others still render.

use thiserror::Error;
use tracing::instrument;

use shopkeep_core::{OrderId, OrderStatus, Price, ProductId, UserId};

use crate::db::{Backend, RepositoryError};
use crate::models::{ManagedUser, NewProduct, Order, Product, ProductImage, ProductUpdate};
use crate::services::catalog::Catalog;
use crate::services::realtime::OrderStatusChanged;
use crate::storage::{ImageStore, StorageError};

/// Errors from admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The caller is not (or no longer) an admin.
    #[error("admin access required")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("image upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("database error: {0}")]
    Backend(RepositoryError),
}

impl From<RepositoryError> for AdminError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Backend(other),
        }
    }
}

impl AdminError {
    /// Whether the message is safe to show to the user as-is.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Backend(_) | Self::Storage(StorageError::Io(_)))
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// One dashboard section: its rows, or the message explaining why it is empty.
#[derive(Debug, Clone)]
pub struct Section<T> {
    pub items: Vec<T>,
    pub error: Option<String>,
}

impl<T> Section<T> {
    fn from_result(what: &str, result: Result<Vec<T>, RepositoryError>) -> Self {
        match result {
            Ok(items) => Self { items, error: None },
            Err(e) => {
                tracing::error!(section = what, error = %e, "Dashboard section failed to load");
                Self {
                    items: Vec::new(),
                    error: Some(format!("Could not load {what}.")),
                }
            }
        }
    }
}

/// Everything the dashboard page shows.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub users: Section<ManagedUser>,
    pub products: Section<Product>,
    pub orders: Section<Order>,
}

impl Dashboard {
    /// Load all three sections concurrently.
    #[instrument(skip(backend))]
    pub async fn load(backend: &dyn Backend) -> Self {
        let (users, products, orders) = tokio::join!(
            backend.list_managed_users(),
            backend.list_products(i64::MAX),
            backend.list_orders(),
        );
        Self {
            users: Section::from_result("users", users),
            products: Section::from_result("products", products),
            orders: Section::from_result("orders", orders),
        }
    }
}

// =============================================================================
// Order board
// =============================================================================

/// Order rows kept current by pushed status changes.
#[derive(Debug, Clone, Default)]
pub struct OrderBoard {
    orders: Vec<Order>,
}

impl OrderBoard {
    #[must_use]
    pub const fn new(orders: Vec<Order>) -> Self {
        Self { orders }
    }

    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Replace the status of the matching order. Unknown ids are ignored.
    ///
    /// Returns the updated row when one matched.
    pub fn apply(&mut self, event: &OrderStatusChanged) -> Option<&Order> {
        let order = self.orders.iter_mut().find(|o| o.id == event.order_id)?;
        order.status = event.status;
        order.updated_at = event.updated_at;
        Some(order)
    }
}

// =============================================================================
// Product drafts
// =============================================================================

/// An uploaded image file.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Raw product form input.
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    pub price: String,
    pub stock_quantity: String,
    /// Link to an externally hosted image. Ignored when an upload is present.
    pub image_url: String,
    pub upload: Option<ImageUpload>,
}

struct ValidDraft {
    name: String,
    description: String,
    price: Price,
    stock_quantity: i32,
    image_url: Option<String>,
    upload: Option<ImageUpload>,
}

impl ProductDraft {
    fn validate(self) -> Result<ValidDraft, AdminError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(AdminError::Invalid("product name is required".to_owned()));
        }
        let price = Price::parse(&self.price)
            .map_err(|e| AdminError::Invalid(format!("price: {e}")))?;
        let stock_quantity = match self.stock_quantity.trim() {
            "" => 0,
            raw => raw
                .parse::<i32>()
                .ok()
                .filter(|n| *n >= 0)
                .ok_or_else(|| {
                    AdminError::Invalid("stock must be a whole number of 0 or more".to_owned())
                })?,
        };
        let image_url = Some(self.image_url.trim().to_owned()).filter(|url| !url.is_empty());
        let upload = self.upload.filter(|u| !u.bytes.is_empty());

        Ok(ValidDraft {
            name,
            description: self.description.trim().to_owned(),
            price,
            stock_quantity,
            image_url,
            upload,
        })
    }
}

// =============================================================================
// Service
// =============================================================================

/// Admin write operations.
pub struct AdminService<'a> {
    backend: &'a dyn Backend,
    images: &'a dyn ImageStore,
    catalog: &'a Catalog,
}

impl<'a> AdminService<'a> {
    #[must_use]
    pub const fn new(
        backend: &'a dyn Backend,
        images: &'a dyn ImageStore,
        catalog: &'a Catalog,
    ) -> Self {
        Self {
            backend,
            images,
            catalog,
        }
    }

    /// Store an upload, or wrap a linked URL.
    async fn resolve_image(
        &self,
        upload: Option<ImageUpload>,
        url: Option<String>,
    ) -> Result<Option<ProductImage>, AdminError> {
        if let Some(upload) = upload {
            let key = self.images.upload(&upload.file_name, &upload.bytes).await?;
            return Ok(Some(ProductImage {
                url: self.images.public_url(&key),
                key: Some(key),
            }));
        }
        Ok(url.map(ProductImage::linked))
    }

    async fn discard_image(&self, key: &str) {
        if let Err(e) = self.images.remove(key).await {
            tracing::warn!(key, error = %e, "Failed to remove product image");
        }
    }

    /// Delete an account and everything that hangs off it.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if the user does not exist.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: UserId) -> Result<(), AdminError> {
        self.backend.delete_user(id).await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Invalid` for bad input and `Storage` if the image
    /// upload fails.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product, AdminError> {
        let draft = draft.validate()?;
        let image = self.resolve_image(draft.upload, draft.image_url).await?;
        let uploaded_key = image.as_ref().and_then(|i| i.key.clone());

        let created = self
            .backend
            .create_product(NewProduct {
                name: draft.name,
                description: draft.description,
                price: draft.price,
                stock_quantity: draft.stock_quantity,
                image,
            })
            .await;

        match created {
            Ok(product) => {
                self.catalog.invalidate().await;
                tracing::info!(product_id = %product.id, "Product created");
                Ok(product)
            }
            Err(e) => {
                if let Some(key) = uploaded_key {
                    self.discard_image(&key).await;
                }
                Err(e.into())
            }
        }
    }

    /// Edit a product. Without a new image the current one is kept.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if the product does not exist,
    /// `Invalid` for bad input and `Storage` if the image upload fails.
    #[instrument(skip(self, draft))]
    pub async fn update_product(
        &self,
        id: ProductId,
        draft: ProductDraft,
    ) -> Result<Product, AdminError> {
        let draft = draft.validate()?;
        let current = self
            .backend
            .get_product(id)
            .await?
            .ok_or(AdminError::NotFound)?;

        // An unchanged URL is not a new image.
        let url = draft
            .image_url
            .filter(|url| current.image_url.as_deref() != Some(url.as_str()));
        let image = self.resolve_image(draft.upload, url).await?;
        let replaced_key = image.as_ref().and(current.image_key.clone());

        let updated = self
            .backend
            .update_product(
                id,
                ProductUpdate {
                    name: draft.name,
                    description: draft.description,
                    price: draft.price,
                    stock_quantity: draft.stock_quantity,
                    image,
                },
            )
            .await?;

        if let Some(key) = replaced_key {
            self.discard_image(&key).await;
        }
        self.catalog.invalidate().await;
        tracing::info!(product_id = %id, "Product updated");
        Ok(updated)
    }

    /// Delete a product, then remove its uploaded image.
    ///
    /// The image is only touched once the row is gone, so a refused delete
    /// leaves the product intact. Image removal is best effort; a failure is
    /// logged and leaves an orphaned file.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::NotFound` if the product does not exist and
    /// `Conflict` if it has been ordered.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), AdminError> {
        let product = self
            .backend
            .get_product(id)
            .await?
            .ok_or(AdminError::NotFound)?;

        self.backend.delete_product(id).await?;

        if let Some(key) = product.image_key.as_deref() {
            self.discard_image(key).await;
        }
        self.catalog.invalidate().await;
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Change an order's status after re-reading the caller's role.
    ///
    /// Any status may follow any other.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Forbidden` if the caller is no longer an admin and
    /// `NotFound` if the order does not exist.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        caller: UserId,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusChanged, AdminError> {
        let role = self.backend.get_role(caller).await.map_err(|e| match e {
            RepositoryError::NotFound => AdminError::Forbidden,
            other => AdminError::Backend(other),
        })?;
        if !role.is_admin() {
            return Err(AdminError::Forbidden);
        }

        let changed = self.backend.update_order_status(order_id, status).await?;
        tracing::info!(order_id = %order_id, status = %status, "Order status updated");
        Ok(changed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use shopkeep_core::{Email, Role, ShippingAddress};

    use super::*;
    use crate::db::{MemoryBackend, Operation};
    use crate::models::{NewAccount, NewOrder, NewOrderItem};
    use crate::storage::MemoryImageStore;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        images: Arc<MemoryImageStore>,
        catalog: Catalog,
    }

    impl Fixture {
        fn service(&self) -> AdminService<'_> {
            AdminService::new(self.backend.as_ref(), self.images.as_ref(), &self.catalog)
        }
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let catalog = Catalog::new(
            Arc::clone(&backend) as Arc<dyn Backend>,
            Duration::from_secs(60),
        );
        Fixture {
            backend,
            images: Arc::new(MemoryImageStore::new()),
            catalog,
        }
    }

    fn draft(name: &str, price: &str) -> ProductDraft {
        ProductDraft {
            name: name.to_owned(),
            description: "A thing".to_owned(),
            price: price.to_owned(),
            stock_quantity: "3".to_owned(),
            ..ProductDraft::default()
        }
    }

    fn upload() -> ImageUpload {
        ImageUpload {
            file_name: "photo.png".to_owned(),
            bytes: b"png".to_vec(),
        }
    }

    async fn account(backend: &MemoryBackend, email: &str, role: Role) -> UserId {
        let email = Email::parse(email).unwrap();
        let profile = backend
            .create_account(NewAccount {
                email: email.clone(),
                full_name: "Someone".to_owned(),
                password_hash: "hash".to_owned(),
            })
            .await
            .unwrap();
        backend.set_role(&email, role).await.unwrap();
        profile.id
    }

    async fn order(backend: &MemoryBackend, user: UserId, product: &Product) -> Order {
        backend
            .create_order(NewOrder {
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
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_dashboard_sections_fail_independently() {
        let f = fixture();
        f.service().create_product(draft("Mug", "12.00")).await.unwrap();
        f.backend.fail_next(Operation::ListManagedUsers).await;

        let dashboard = Dashboard::load(f.backend.as_ref()).await;
        assert!(dashboard.users.error.is_some());
        assert!(dashboard.products.error.is_none());
        assert_eq!(dashboard.products.items.len(), 1);
        assert!(dashboard.orders.error.is_none());
    }

    #[tokio::test]
    async fn test_create_product_with_upload() {
        let f = fixture();
        let mut d = draft("Mug", "$12.50");
        d.upload = Some(upload());

        let product = f.service().create_product(d).await.unwrap();
        let key = product.image_key.clone().unwrap();
        assert_eq!(product.image_url.as_deref(), Some(format!("/media/{key}").as_str()));
        assert!(f.images.contains(&key).await);
        assert_eq!(product.price, Price::from_cents(1250).unwrap());
    }

    #[tokio::test]
    async fn test_create_product_with_linked_image() {
        let f = fixture();
        let mut d = draft("Mug", "5");
        d.image_url = "https://cdn.example.com/mug.jpg".to_owned();

        let product = f.service().create_product(d).await.unwrap();
        assert_eq!(product.image_key, None);
        assert_eq!(
            product.image_url.as_deref(),
            Some("https://cdn.example.com/mug.jpg")
        );
        assert!(f.images.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_product_rejects_bad_input() {
        let f = fixture();
        let service = f.service();
        assert!(matches!(
            service.create_product(draft("  ", "1.00")).await,
            Err(AdminError::Invalid(_))
        ));
        assert!(matches!(
            service.create_product(draft("Mug", "-1")).await,
            Err(AdminError::Invalid(_))
        ));
        let mut d = draft("Mug", "1.00");
        d.stock_quantity = "-2".to_owned();
        assert!(matches!(
            service.create_product(d).await,
            Err(AdminError::Invalid(_))
        ));
        assert_eq!(f.backend.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_create_discards_upload() {
        let f = fixture();
        f.backend.fail_next(Operation::CreateProduct).await;
        let mut d = draft("Mug", "1.00");
        d.upload = Some(upload());

        assert!(f.service().create_product(d).await.is_err());
        assert!(f.images.is_empty().await);
    }

    #[tokio::test]
    async fn test_product_writes_invalidate_catalog() {
        let f = fixture();
        let service = f.service();
        assert!(f.catalog.listing().await.unwrap().is_empty());

        let product = service.create_product(draft("Mug", "1.00")).await.unwrap();
        assert_eq!(f.catalog.listing().await.unwrap().len(), 1);

        service
            .update_product(product.id, draft("Big Mug", "2.00"))
            .await
            .unwrap();
        assert_eq!(f.catalog.listing().await.unwrap()[0].name, "Big Mug");

        service.delete_product(product.id).await.unwrap();
        assert!(f.catalog.listing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_uploaded_image() {
        let f = fixture();
        let service = f.service();
        let mut d = draft("Mug", "1.00");
        d.upload = Some(upload());
        let product = service.create_product(d).await.unwrap();
        let old_key = product.image_key.clone().unwrap();

        let mut d = draft("Mug", "1.00");
        d.upload = Some(upload());
        let updated = service.update_product(product.id, d).await.unwrap();
        let new_key = updated.image_key.unwrap();

        assert_ne!(old_key, new_key);
        assert!(!f.images.contains(&old_key).await);
        assert!(f.images.contains(&new_key).await);
    }

    #[tokio::test]
    async fn test_update_without_image_keeps_current() {
        let f = fixture();
        let service = f.service();
        let mut d = draft("Mug", "1.00");
        d.upload = Some(upload());
        let product = service.create_product(d).await.unwrap();

        let mut d = draft("Mug", "3.00");
        d.image_url = product.image_url.clone().unwrap();
        let updated = service.update_product(product.id, d).await.unwrap();
        assert_eq!(updated.image_key, product.image_key);
        assert_eq!(updated.price, Price::from_cents(300).unwrap());
    }

    #[tokio::test]
    async fn test_delete_product_removes_image() {
        let f = fixture();
        let service = f.service();
        let mut d = draft("Mug", "1.00");
        d.upload = Some(upload());
        let product = service.create_product(d).await.unwrap();

        service.delete_product(product.id).await.unwrap();
        assert!(f.images.is_empty().await);
        assert!(f.backend.get_product(product.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_ordered_product_conflicts() {
        let f = fixture();
        let service = f.service();
        let buyer = account(&f.backend, "buyer@example.com", Role::Normal).await;
        let mut d = draft("Mug", "1.00");
        d.upload = Some(upload());
        let product = service.create_product(d).await.unwrap();
        let key = product.image_key.clone().unwrap();
        order(&f.backend, buyer, &product).await;

        assert!(matches!(
            service.delete_product(product.id).await,
            Err(AdminError::Conflict(_))
        ));

        // The refused delete leaves both the row and its image in place.
        assert!(f.images.contains(&key).await);
        let kept = f.backend.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(kept.image_key.as_deref(), Some(key.as_str()));
    }

    #[tokio::test]
    async fn test_status_update_requires_current_admin() {
        let f = fixture();
        let service = f.service();
        let admin = account(&f.backend, "admin@example.com", Role::Admin).await;
        let shopper = account(&f.backend, "shopper@example.com", Role::Normal).await;
        let product = service.create_product(draft("Mug", "1.00")).await.unwrap();
        let placed = order(&f.backend, shopper, &product).await;

        assert!(matches!(
            service
                .update_order_status(shopper, placed.id, OrderStatus::Completed)
                .await,
            Err(AdminError::Forbidden)
        ));

        let changed = service
            .update_order_status(admin, placed.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(changed.status, OrderStatus::Completed);

        // Any status may follow any other.
        service
            .update_order_status(admin, placed.id, OrderStatus::Pending)
            .await
            .unwrap();

        f.backend
            .set_role(&Email::parse("admin@example.com").unwrap(), Role::Normal)
            .await
            .unwrap();
        assert!(matches!(
            service
                .update_order_status(admin, placed.id, OrderStatus::Cancelled)
                .await,
            Err(AdminError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_user_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service().delete_user(UserId::new_v4()).await,
            Err(AdminError::NotFound)
        ));
    }

    #[test]
    fn test_order_board_replaces_matching_status_only() {
        let now = Utc::now();
        let make = |status| Order {
            id: OrderId::new_v4(),
            user_id: UserId::new_v4(),
            status,
            payment_method: "visa".to_owned(),
            shipping: ShippingAddress::default(),
            total_amount: Price::ZERO,
            created_at: now,
            updated_at: now,
        };
        let first = make(OrderStatus::Pending);
        let second = make(OrderStatus::Pending);
        let mut board = OrderBoard::new(vec![first.clone(), second.clone()]);

        let updated = board
            .apply(&OrderStatusChanged {
                order_id: second.id,
                status: OrderStatus::Processing,
                updated_at: now,
            })
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(board.orders()[0], first);
        assert_eq!(board.orders()[1].status, OrderStatus::Processing);

        assert!(board
            .apply(&OrderStatusChanged {
                order_id: OrderId::new_v4(),
                status: OrderStatus::Cancelled,
                updated_at: now,
            })
            .is_none());
        assert_eq!(board.orders()[0], first);
    }
}
