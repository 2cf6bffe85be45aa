//! Checkout route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use shopkeep_core::ShippingAddress;

use super::cart::CartView;
use super::{Layout, MessageQuery, with_error, with_notice};
use crate::middleware::auth::LOGIN_PATH;
use crate::middleware::{OptionalAuth, RequireAuth};
use crate::models::CurrentUser;
use crate::services::cart::CartHolder;
use crate::services::checkout::{Checkout, CheckoutError, CheckoutForm};
use crate::state::AppState;

/// Shipping fields echoed back into the form. Card fields never are.
#[derive(Clone, Default)]
pub struct AddressView {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl From<ShippingAddress> for AddressView {
    fn from(address: ShippingAddress) -> Self {
        Self {
            street: address.street,
            city: address.city,
            state: address.state,
            zip: address.zip,
        }
    }
}

impl From<&CheckoutForm> for AddressView {
    fn from(form: &CheckoutForm) -> Self {
        Self {
            street: form.street.clone(),
            city: form.city.clone(),
            state: form.state.clone(),
            zip: form.zip.clone(),
        }
    }
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub layout: Layout,
    pub cart: CartView,
    pub address: AddressView,
}

/// Render the checkout form for `user`, or send them back to an empty cart.
async fn render(
    state: &AppState,
    user: &CurrentUser,
    address: AddressView,
    messages: MessageQuery,
) -> Response {
    let holder = match CartHolder::load(state.backend(), Some(user)).await {
        Ok(holder) => holder,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load cart for checkout");
            return with_error("/cart", "Could not load your cart. Please try again.")
                .into_response();
        }
    };
    if holder.is_empty() {
        return with_error("/cart", "Your cart is empty.").into_response();
    }

    CheckoutTemplate {
        layout: Layout::load(state, Some(user), messages).await,
        cart: CartView::from(&holder),
        address,
    }
    .into_response()
}

/// Display the checkout form, prefilled with the saved address.
#[instrument(skip(state, user, messages), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(messages): Query<MessageQuery>,
) -> Response {
    let address = match state.backend().get_profile(user.id).await {
        Ok(profile) => profile
            .and_then(|p| p.address)
            .map(AddressView::from)
            .unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load saved address");
            AddressView::default()
        }
    };

    render(&state, &user, address, messages).await
}

/// Place the order.
///
/// Form errors re-render the page with the shipping fields kept.
#[instrument(skip(state, user, form))]
pub async fn submit(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Form(form): Form<CheckoutForm>,
) -> Response {
    let result = Checkout::new(state.backend()).submit(user.as_ref(), &form).await;

    let (user, error) = match (result, user) {
        (Ok(order_id), _) => {
            tracing::info!(order_id = %order_id, "Checkout complete");
            return with_notice("/orders", "Thank you! Your order has been placed.")
                .into_response();
        }
        (Err(CheckoutError::AuthenticationRequired), _) | (Err(_), None) => {
            return with_error(LOGIN_PATH, "Please sign in to check out.").into_response();
        }
        (Err(CheckoutError::EmptyCart), _) => {
            return with_error("/cart", "Your cart is empty.").into_response();
        }
        (Err(e), Some(user)) if e.is_user_facing() => (user, e.to_string()),
        (Err(e), Some(user)) => {
            tracing::error!(error = %e, "Checkout failed");
            (user, "We could not place your order. Please try again.".to_owned())
        }
    };

    let messages = MessageQuery {
        error: Some(super::sentence(&error)),
        notice: None,
    };
    render(&state, &user, AddressView::from(&form), messages).await
}
