//! Per-request cart state.
//!
//! A [`CartHolder`] is built for each request from the session's user and the
//! backend. Mutations write remotely first and mirror the change into the
//! local lines only once the write succeeded, so a failed call leaves the
//! holder exactly as it was.

use thiserror::Error;
use tracing::instrument;

use shopkeep_core::cart::{self, CartLine, CartTotals};
use shopkeep_core::{Price, ProductId, UserId};

use crate::db::{Backend, RepositoryError};
use crate::models::{CurrentUser, Product};

/// Errors from cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No user is signed in. Nothing was sent to the backend.
    #[error("please sign in to update your cart")]
    AuthenticationRequired,

    /// The line is already at the largest storable quantity.
    #[error("that item cannot be added again")]
    QuantityLimit,

    /// The backend rejected the write. Local state is unchanged.
    #[error("cart update failed: {0}")]
    Backend(#[from] RepositoryError),
}

/// Cart lines for one user, for the lifetime of a request.
pub struct CartHolder<'a> {
    backend: &'a dyn Backend,
    user: Option<UserId>,
    lines: Vec<CartLine>,
}

impl<'a> CartHolder<'a> {
    /// Load the persisted cart. An anonymous holder starts empty.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the lines cannot be read.
    pub async fn load(
        backend: &'a dyn Backend,
        user: Option<&CurrentUser>,
    ) -> Result<Self, RepositoryError> {
        let user = user.map(|u| u.id);
        let lines = match user {
            Some(id) => backend.list_cart(id).await?,
            None => Vec::new(),
        };
        Ok(Self {
            backend,
            user,
            lines,
        })
    }

    /// An empty holder that has not read the backend.
    #[must_use]
    pub const fn empty(backend: &'a dyn Backend, user: Option<UserId>) -> Self {
        Self {
            backend,
            user,
            lines: Vec::new(),
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    #[must_use]
    pub fn total_items(&self) -> i64 {
        cart::total_items(&self.lines)
    }

    #[must_use]
    pub fn total_price(&self) -> Price {
        cart::total_price(&self.lines)
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        CartTotals::of(&self.lines)
    }

    fn require_user(&self) -> Result<UserId, CartError> {
        self.user.ok_or(CartError::AuthenticationRequired)
    }

    /// Add one unit of `product`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::AuthenticationRequired` for anonymous holders,
    /// `CartError::QuantityLimit` when the line cannot grow, and
    /// `CartError::Backend` if the upsert fails.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add(&mut self, product: &Product) -> Result<i32, CartError> {
        let user = self.require_user()?;
        let quantity =
            cart::quantity_after_add(&self.lines, product.id).ok_or(CartError::QuantityLimit)?;

        self.backend
            .upsert_cart_item(user, product.id, quantity)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to add to cart"))?;

        Ok(cart::apply_add(&mut self.lines, product.as_line_product()))
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::AuthenticationRequired` for anonymous holders and
    /// `CartError::Backend` if the delete fails.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, product_id: ProductId) -> Result<(), CartError> {
        let user = self.require_user()?;

        self.backend
            .delete_cart_item(user, product_id)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to remove from cart"))?;

        cart::apply_remove(&mut self.lines, product_id);
        Ok(())
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::AuthenticationRequired` for anonymous holders and
    /// `CartError::Backend` if the write fails.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), CartError> {
        let user = self.require_user()?;

        if quantity <= 0 {
            self.backend
                .delete_cart_item(user, product_id)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to remove from cart"))?;
        } else {
            self.backend
                .upsert_cart_item(user, product_id, quantity)
                .await
                .inspect_err(|e| tracing::error!(error = %e, "Failed to update cart quantity"))?;
        }

        cart::apply_set_quantity(&mut self.lines, product_id, quantity);
        Ok(())
    }

    /// Remove every line.
    ///
    /// # Errors
    ///
    /// Returns `CartError::AuthenticationRequired` for anonymous holders and
    /// `CartError::Backend` if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear(&mut self) -> Result<(), CartError> {
        let user = self.require_user()?;

        self.backend
            .clear_cart(user)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to clear cart"))?;

        self.lines.clear();
        Ok(())
    }
}
