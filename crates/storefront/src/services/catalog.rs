//! Product catalog with a cached listing.
//!
//! The home page listing (the newest products) is cached under a single fixed
//! key. Every admin product write invalidates it, so the next request reads
//! the live rows.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use shopkeep_core::ProductId;

use crate::db::{Backend, RepositoryError};
use crate::models::Product;

/// Cache key for the listing.
pub const LISTING_KEY: &str = "product-listing";

/// Number of products on the listing.
pub const LISTING_LIMIT: i64 = 20;

/// Product catalog over a backend.
#[derive(Clone)]
pub struct Catalog {
    backend: Arc<dyn Backend>,
    cache: Cache<String, Arc<Vec<Product>>>,
}

impl Catalog {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self { backend, cache }
    }

    /// The newest products, from cache when present.
    ///
    /// # Errors
    ///
    /// Returns the backend error when there is no cached copy and the live
    /// fetch fails.
    #[instrument(skip(self))]
    pub async fn listing(&self) -> Result<Arc<Vec<Product>>, RepositoryError> {
        if let Some(products) = self.cache.get(LISTING_KEY).await {
            debug!(count = products.len(), "Serving cached product listing");
            return Ok(products);
        }

        let products = Arc::new(self.backend.list_products(LISTING_LIMIT).await?);
        self.cache
            .insert(LISTING_KEY.to_owned(), Arc::clone(&products))
            .await;
        Ok(products)
    }

    /// A single product, always read live.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lookup fails.
    pub async fn product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.backend.get_product(id).await
    }

    /// Drop the cached listing.
    pub async fn invalidate(&self) {
        self.cache.invalidate(LISTING_KEY).await;
        debug!("Product listing cache invalidated");
    }

    /// Whether a listing is currently cached.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache.contains_key(LISTING_KEY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shopkeep_core::Price;

    use super::*;
    use crate::db::{MemoryBackend, Operation};
    use crate::models::NewProduct;

    fn product(name: &str) -> NewProduct {
        NewProduct {
            name: name.to_owned(),
            description: String::new(),
            price: Price::from_cents(500).unwrap(),
            stock_quantity: 1,
            image: None,
        }
    }

    fn catalog(backend: &Arc<MemoryBackend>) -> Catalog {
        Catalog::new(
            Arc::clone(backend) as Arc<dyn Backend>,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_listing_is_cached() {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_product(product("Tea")).await.unwrap();
        let catalog = catalog(&backend);

        assert_eq!(catalog.listing().await.unwrap().len(), 1);
        assert_eq!(catalog.listing().await.unwrap().len(), 1);
        assert_eq!(backend.call_count(Operation::ListProducts).await, 1);
        assert!(catalog.is_cached());
    }

    #[tokio::test]
    async fn test_invalidate_forces_live_read() {
        let backend = Arc::new(MemoryBackend::new());
        let catalog = catalog(&backend);
        assert!(catalog.listing().await.unwrap().is_empty());

        backend.create_product(product("Coffee")).await.unwrap();
        assert!(catalog.listing().await.unwrap().is_empty());

        catalog.invalidate().await;
        assert_eq!(catalog.listing().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_without_cache_surfaces() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(Operation::ListProducts).await;
        let catalog = catalog(&backend);

        assert!(catalog.listing().await.is_err());
        assert!(!catalog.is_cached());
        assert!(catalog.listing().await.is_ok());
    }

    #[tokio::test]
    async fn test_cached_copy_survives_backend_failure() {
        let backend = Arc::new(MemoryBackend::new());
        backend.create_product(product("Tea")).await.unwrap();
        let catalog = catalog(&backend);
        catalog.listing().await.unwrap();

        backend.fail_next(Operation::ListProducts).await;
        assert_eq!(catalog.listing().await.unwrap().len(), 1);
    }
}
