//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transactions)
//! 2. `TraceLayer` (request tracing)
//! 3. Session layer (tower-sessions; `PostgreSQL` store in production)
//! 4. Request ID (add unique ID to each request)
//! 5. Security headers (CSP, frame and isolation policies)
//! 6. Admin guard (`/admin` routes only)

pub mod admin_guard;
pub mod auth;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use admin_guard::require_admin;
pub use auth::{OptionalAuth, RequireAuth, clear_current_user, set_current_user};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session::create_session_layer;
