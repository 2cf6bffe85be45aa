//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::Backend;
use crate::services::admin::AdminService;
use crate::services::catalog::Catalog;
use crate::storage::ImageStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. It holds no per-user state:
/// handlers build the request context (current user, cart) from the session
/// on each request.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: Arc<dyn Backend>,
    images: Arc<dyn ImageStore>,
    catalog: Catalog,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `backend` - Data backend (Postgres in production)
    /// * `images` - Product image storage
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        backend: Arc<dyn Backend>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        let catalog = Catalog::new(Arc::clone(&backend), config.catalog_ttl);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                images,
                catalog,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the data backend.
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    /// Get a reference to product image storage.
    #[must_use]
    pub fn images(&self) -> &dyn ImageStore {
        self.inner.images.as_ref()
    }

    /// Get a reference to the product catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Admin operations over this state's backend, storage and catalog.
    #[must_use]
    pub fn admin(&self) -> AdminService<'_> {
        AdminService::new(self.backend(), self.images(), self.catalog())
    }
}
