//! Authentication route handlers.
//!
//! Password login and registration against the local account tables.
//! A successful login or registration signs the user in immediately.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::{Layout, MessageQuery, with_error};
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::middleware::auth::LOGIN_PATH;
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

const REGISTER_PATH: &str = "/register";

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub password_confirm: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
}

/// Message shown for an auth failure. Internal errors stay in the logs.
fn failure_message(err: &AuthError) -> String {
    if err.is_user_facing() {
        err.to_string()
    } else {
        tracing::error!(error = %err, "Authentication failed");
        "Something went wrong. Please try again.".to_owned()
    }
}

/// Put `user` into the session and go to the catalog.
async fn sign_in(session: &Session, user: &CurrentUser, from: &str) -> Response {
    if let Err(e) = set_current_user(session, user).await {
        tracing::error!(error = %e, "Failed to set session");
        return with_error(from, "Could not sign you in. Please try again.").into_response();
    }
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Redirect::to("/").into_response()
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page. Signed-in users go to the catalog.
pub async fn login_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    LoginTemplate {
        layout: Layout::anonymous(query),
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    match AuthService::new(state.backend())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "User logged in");
            sign_in(&session, &user, LOGIN_PATH).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            with_error(LOGIN_PATH, &failure_message(&e)).into_response()
        }
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page. Signed-in users go to the catalog.
pub async fn register_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    RegisterTemplate {
        layout: Layout::anonymous(query),
    }
    .into_response()
}

/// Handle registration form submission.
#[instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return with_error(REGISTER_PATH, "Passwords do not match.").into_response();
    }

    match AuthService::new(state.backend())
        .register(&form.email, &form.full_name, &form.password)
        .await
    {
        Ok(user) => sign_in(&session, &user, REGISTER_PATH).await,
        Err(e) => {
            tracing::warn!(error = %e, "Registration failed");
            with_error(REGISTER_PATH, &failure_message(&e)).into_response()
        }
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Handle logout: drop the whole session.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!(error = %e, "Failed to clear session");
    }
    clear_sentry_user();
    Redirect::to("/").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RepositoryError;

    #[test]
    fn test_failure_message_hides_internal_errors() {
        assert_eq!(
            failure_message(&AuthError::Repository(RepositoryError::NotFound)),
            "Something went wrong. Please try again."
        );
        assert_eq!(
            failure_message(&AuthError::InvalidCredentials),
            AuthError::InvalidCredentials.to_string()
        );
    }
}
