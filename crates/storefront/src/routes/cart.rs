//! Cart route handlers.
//!
//! Anyone can view the cart page; changing it needs a signed-in shopper.
//! Every mutation goes through [`CartHolder`], which refuses anonymous
//! callers before touching the backend.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;

use shopkeep_core::cart::CartLine;
use shopkeep_core::{Price, ProductId};

use super::{Layout, MessageQuery, with_error, with_notice};
use crate::error::add_breadcrumb;
use crate::middleware::OptionalAuth;
use crate::middleware::auth::LOGIN_PATH;
use crate::services::cart::{CartError, CartHolder};
use crate::state::AppState;

const CART_PATH: &str = "/cart";

/// Cart line display data for templates.
#[derive(Clone)]
pub struct CartItemView {
    pub product_id: String,
    pub name: String,
    pub price: String,
    pub quantity: i32,
    pub line_price: String,
    pub image_url: Option<String>,
}

impl From<&CartLine> for CartItemView {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            name: line.name.clone(),
            price: line.price.to_string(),
            quantity: line.quantity,
            line_price: line.subtotal().to_string(),
            image_url: line.image_url.clone(),
        }
    }
}

/// Cart display data for templates.
#[derive(Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: i64,
}

impl CartView {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal: Price::ZERO.to_string(),
            item_count: 0,
        }
    }
}

impl From<&CartHolder<'_>> for CartView {
    fn from(holder: &CartHolder<'_>) -> Self {
        Self {
            items: holder.lines().iter().map(CartItemView::from).collect(),
            subtotal: holder.total_price().to_string(),
            item_count: holder.total_items(),
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: ProductId,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: ProductId,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub signed_in: bool,
}

/// Map a failed cart mutation to the page the shopper should see.
fn cart_failure(err: &CartError) -> Redirect {
    match err {
        CartError::AuthenticationRequired => {
            with_error(LOGIN_PATH, "Please sign in to use your cart.")
        }
        CartError::QuantityLimit => with_error(CART_PATH, "That item cannot be added again."),
        CartError::Backend(_) => with_error(CART_PATH, "Could not update your cart. Please try again."),
    }
}

/// Display cart page.
#[instrument(skip(state, user, messages))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(messages): Query<MessageQuery>,
) -> impl IntoResponse {
    let mut layout = Layout::load(&state, user.as_ref(), messages).await;

    let cart = match CartHolder::load(state.backend(), user.as_ref()).await {
        Ok(holder) => CartView::from(&holder),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart");
            layout.fail("Could not load your cart. Please try again.");
            CartView::empty()
        }
    };

    CartShowTemplate {
        layout,
        cart,
        signed_in: user.is_some(),
    }
}

/// Add one of a product to the cart.
///
/// Anonymous visitors are sent to the login page.
#[instrument(skip(state, user))]
pub async fn add(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<AddToCartForm>,
) -> Response {
    let product = match state.catalog().product(form.product_id).await {
        Ok(Some(product)) => product,
        Ok(None) => return with_error("/", "That product is no longer available.").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load product for cart");
            return with_error("/", "Could not add to cart. Please try again.").into_response();
        }
    };

    let mut holder = match CartHolder::load(state.backend(), user.as_ref()).await {
        Ok(holder) => holder,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart");
            return with_error(CART_PATH, "Could not load your cart. Please try again.")
                .into_response();
        }
    };

    match holder.add(&product).await {
        Ok(quantity) => {
            let product_id = product.id.to_string();
            add_breadcrumb(
                "cart",
                "Added product",
                Some(&[("product_id", product_id.as_str())][..]),
            );
            let message = if quantity > 1 {
                format!("{} now in your cart ({quantity}).", product.name)
            } else {
                format!("{} added to your cart.", product.name)
            };
            with_notice(CART_PATH, &message).into_response()
        }
        Err(e) => cart_failure(&e).into_response(),
    }
}

/// Set the quantity of a cart line. Zero or less removes it.
#[instrument(skip(state, user))]
pub async fn update(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<UpdateCartForm>,
) -> Response {
    let mut holder = CartHolder::empty(state.backend(), user.map(|u| u.id));
    match holder.set_quantity(form.product_id, form.quantity).await {
        Ok(()) => Redirect::to(CART_PATH).into_response(),
        Err(e) => cart_failure(&e).into_response(),
    }
}

/// Remove a line from the cart.
#[instrument(skip(state, user))]
pub async fn remove(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<RemoveFromCartForm>,
) -> Response {
    let mut holder = CartHolder::empty(state.backend(), user.map(|u| u.id));
    match holder.remove(form.product_id).await {
        Ok(()) => with_notice(CART_PATH, "Item removed.").into_response(),
        Err(e) => cart_failure(&e).into_response(),
    }
}

/// Empty the cart.
#[instrument(skip(state, user))]
pub async fn clear(State(state): State<AppState>, OptionalAuth(user): OptionalAuth) -> Response {
    let mut holder = CartHolder::empty(state.backend(), user.map(|u| u.id));
    match holder.clear().await {
        Ok(()) => with_notice(CART_PATH, "Your cart is empty.").into_response(),
        Err(e) => cart_failure(&e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::header::LOCATION;

    use super::*;
    use crate::db::RepositoryError;

    #[test]
    fn test_anonymous_failure_goes_to_login() {
        let response = cart_failure(&CartError::AuthenticationRequired).into_response();
        assert!(
            response.headers()[LOCATION]
                .to_str()
                .is_ok_and(|l| l.starts_with("/login?error="))
        );
    }

    #[test]
    fn test_backend_failure_stays_on_cart() {
        let response =
            cart_failure(&CartError::Backend(RepositoryError::NotFound)).into_response();
        assert!(
            response.headers()[LOCATION]
                .to_str()
                .is_ok_and(|l| l.starts_with("/cart?error="))
        );
    }
}
