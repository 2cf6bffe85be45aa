//! Route guard for the admin section.
//!
//! Layered on every `/admin` route. Each request re-reads the caller's role;
//! nothing is cached between requests.
//!
//! | Caller | Result |
//! |--------|--------|
//! | no session user | redirect to `/login` |
//! | role lookup fails (or profile gone) | redirect to `/login` |
//! | signed in, not admin | redirect to `/` |
//! | admin | request continues |

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use super::auth::{LOGIN_PATH, current_user};
use crate::state::AppState;

/// Middleware that admits only admins.
///
/// On success the [`CurrentUser`](crate::models::CurrentUser) is inserted into
/// the request extensions for downstream handlers.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let Some(user) = current_user(&parts).await else {
        return Redirect::to(LOGIN_PATH).into_response();
    };

    match state.backend().get_role(user.id).await {
        Ok(role) if role.is_admin() => {
            parts.extensions.insert(user);
            next.run(Request::from_parts(parts, body)).await
        }
        Ok(_) => {
            tracing::info!(user_id = %user.id, path = %parts.uri.path(), "Non-admin turned away from admin section");
            Redirect::to("/").into_response()
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, error = %e, "Role lookup failed");
            Redirect::to(LOGIN_PATH).into_response()
        }
    }
}
