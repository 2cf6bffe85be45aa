//! HTTP route handlers for the storefront and admin dashboard.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Catalog (20 newest products)
//! GET  /products/{id}             - Product detail
//!
//! # Cart (requires login to change)
//! GET  /cart                      - Cart page
//! POST /cart/add                  - Add one of a product
//! POST /cart/update               - Set a line's quantity (0 removes)
//! POST /cart/remove               - Remove a line
//! POST /cart/clear                - Empty the cart
//!
//! # Checkout and orders (requires login)
//! GET  /checkout                  - Checkout form
//! POST /checkout                  - Place the order
//! GET  /orders                    - Order history
//!
//! # Auth
//! GET  /login, POST /login        - Password login
//! GET  /register, POST /register  - Create an account
//! POST /logout                    - End the session
//!
//! # Admin (every path guarded by `require_admin`)
//! GET  /admin-dashboard           - Redirect to /admin
//! GET  /admin                     - Dashboard
//! POST /admin/users/{id}/delete
//! GET  /admin/products/new        - New product form
//! POST /admin/products            - Create product (multipart)
//! GET  /admin/products/{id}/edit  - Edit product form
//! POST /admin/products/{id}       - Update product (multipart)
//! POST /admin/products/{id}/delete
//! POST /admin/orders/{id}/status
//! GET  /admin/orders/events       - Server-sent order status changes
//!
//! # Infrastructure
//! GET  /health, /health/ready
//! GET  /media/*                   - Uploaded product images
//! GET  /static/*                  - Stylesheet and scripts
//! ```
//!
//! Handlers report failures through the `?error=` / `?notice=` query banner
//! and keep the page usable.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod home;
pub mod orders;
pub mod products;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::Redirect,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::services::ServeDir;

use crate::middleware::{request_id_middleware, require_admin, security_headers_middleware};
use crate::models::CurrentUser;
use crate::state::AppState;
use crate::storage::MEDIA_PREFIX;

// =============================================================================
// Page chrome
// =============================================================================

/// Banner messages carried across a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Header and banner data every page renders.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub user_name: Option<String>,
    pub is_admin: bool,
    pub cart_count: i64,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl Layout {
    /// Build the layout for the current visitor.
    ///
    /// Header lookups are best effort: a failure shows an empty badge rather
    /// than failing the page.
    pub async fn load(state: &AppState, user: Option<&CurrentUser>, messages: MessageQuery) -> Self {
        let Some(user) = user else {
            return Self::anonymous(messages);
        };

        let backend = state.backend();
        let (role, cart) = tokio::join!(backend.get_role(user.id), backend.list_cart(user.id));

        let is_admin = role
            .inspect_err(|e| tracing::warn!(user_id = %user.id, error = %e, "Role lookup failed"))
            .is_ok_and(|role| role.is_admin());
        let cart_count = cart
            .inspect_err(|e| tracing::warn!(user_id = %user.id, error = %e, "Cart count failed"))
            .map_or(0, |lines| shopkeep_core::cart::total_items(&lines));

        Self {
            user_name: Some(user.full_name.clone()),
            is_admin,
            cart_count,
            error: messages.error,
            notice: messages.notice,
        }
    }

    #[must_use]
    pub fn anonymous(messages: MessageQuery) -> Self {
        Self {
            error: messages.error,
            notice: messages.notice,
            ..Self::default()
        }
    }

    /// Show `message` unless the page already carries an error.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }
}

/// Redirect to `path` with an error banner.
#[must_use]
pub fn with_error(path: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{path}?error={}", urlencoding::encode(&sentence(message))))
}

/// Redirect to `path` with a notice banner.
#[must_use]
pub fn with_notice(path: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{path}?notice={}", urlencoding::encode(&sentence(message))))
}

/// Upper-case the first letter of a service message for display.
fn sentence(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

// =============================================================================
// Router
// =============================================================================

/// Build the application router (without the session layer).
///
/// `main` wraps the result with the session layer, tracing and Sentry; tests
/// add an in-memory session store instead.
pub fn app(state: AppState) -> Router {
    let media_dir = state.config().media_dir.clone();

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes(state.clone()))
        .nest_service(MEDIA_PREFIX, ServeDir::new(media_dir))
        .nest_service(
            "/static",
            ServeDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
        )
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Create all page routes.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/products/{id}", get(products::show))
        .nest("/cart", cart_routes())
        .route("/checkout", get(checkout::show).post(checkout::submit))
        .route("/orders", get(orders::index))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/admin-dashboard", get(admin::legacy_redirect))
        .nest("/admin", admin_routes(state))
}

/// Cart routes.
fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Admin routes, all behind the admin guard.
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(admin::dashboard))
        .route("/users/{id}/delete", post(admin::delete_user))
        .route("/products", post(admin::create_product))
        .route("/products/new", get(admin::new_product))
        .route("/products/{id}", post(admin::update_product))
        .route("/products/{id}/edit", get(admin::edit_product))
        .route("/products/{id}/delete", post(admin::delete_product))
        .route("/orders/{id}/status", post(admin::update_order_status))
        .route("/orders/events", get(admin::order_events))
        .layer(DefaultBodyLimit::max(admin::MAX_UPLOAD_BYTES))
        .layer(from_fn_with_state(state, require_admin))
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the backend is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.backend().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_capitalizes_first_letter() {
        assert_eq!(sentence("your cart is empty"), "Your cart is empty");
        assert_eq!(sentence(""), "");
    }

    #[test]
    fn test_banner_redirect_encodes_message() {
        let response = axum::response::IntoResponse::into_response(with_error(
            "/cart",
            "could not update & retry",
        ));
        assert_eq!(
            response.headers()[axum::http::header::LOCATION],
            "/cart?error=Could%20not%20update%20%26%20retry"
        );
    }

    #[test]
    fn test_layout_fail_keeps_first_error() {
        let mut layout = Layout::anonymous(MessageQuery {
            error: Some("first".to_owned()),
            notice: None,
        });
        layout.fail("second");
        assert_eq!(layout.error.as_deref(), Some("first"));
    }
}
