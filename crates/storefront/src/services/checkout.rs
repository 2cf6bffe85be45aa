//! Checkout: turn a cart into an order.

use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;

use shopkeep_core::payment::{CardError, validate_card};
use shopkeep_core::{AddressError, OrderId, ShippingAddress};

use crate::db::{Backend, RepositoryError};
use crate::models::{CurrentUser, NewOrder, NewOrderItem};

/// Checkout form fields. Card data is validated and then dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub card_number: String,
    #[serde(default)]
    pub expiry: String,
    #[serde(default)]
    pub cvc: String,
}

impl CheckoutForm {
    fn address(&self) -> ShippingAddress {
        ShippingAddress {
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
        }
    }
}

/// Errors from checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("please sign in to check out")]
    AuthenticationRequired,

    #[error("your cart is empty")]
    EmptyCart,

    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    #[error(transparent)]
    InvalidCard(#[from] CardError),

    #[error("checkout failed: {0}")]
    Backend(#[from] RepositoryError),
}

impl CheckoutError {
    /// Whether the message is safe to show to the user as-is.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

/// Checkout over a backend.
pub struct Checkout<'a> {
    backend: &'a dyn Backend,
}

impl<'a> Checkout<'a> {
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Place an order for the user's current cart.
    ///
    /// Creates one `pending` order whose total is the cart total and one item
    /// per cart line priced at the product's current price, then clears the
    /// cart. A failed clear is logged and the order still stands.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::AuthenticationRequired` without a user,
    /// `EmptyCart` when there is nothing to buy, `InvalidAddress` or
    /// `InvalidCard` for bad form input, and `Backend` if the order could not
    /// be written. Nothing is persisted on error.
    #[instrument(skip(self, user, form), fields(user_id))]
    pub async fn submit(
        &self,
        user: Option<&CurrentUser>,
        form: &CheckoutForm,
    ) -> Result<OrderId, CheckoutError> {
        let user = user.ok_or(CheckoutError::AuthenticationRequired)?;
        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        let lines = self.backend.list_cart(user.id).await?;
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let shipping = form.address().validate()?;
        let payment = validate_card(&form.card_number, &form.expiry, &form.cvc)?;

        let total_amount = shopkeep_core::cart::total_price(&lines);
        let items = lines
            .iter()
            .map(|line| NewOrderItem {
                product_id: line.product_id,
                quantity: line.quantity,
                price_at_time: line.price,
            })
            .collect();

        let order = self
            .backend
            .create_order(NewOrder {
                user_id: user.id,
                payment_method: payment.as_str().to_owned(),
                shipping,
                total_amount,
                items,
            })
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to create order"))?;

        tracing::info!(order_id = %order.id, total = %order.total_amount, "Order placed");

        if let Err(e) = self.backend.clear_cart(user.id).await {
            tracing::error!(order_id = %order.id, error = %e, "Order placed but cart not cleared");
        }

        Ok(order.id)
    }
}
