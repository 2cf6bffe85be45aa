//! User role management.
//!
//! # Usage
//!
//! ```bash
//! sk-cli user promote --email admin@example.com
//! sk-cli user demote --email admin@example.com
//! ```
//!
//! The change applies on the user's next request: the admin guard re-reads
//! the role every time.

use shopkeep_core::{Email, Role};
use shopkeep_storefront::db::{Backend, PgBackend, RepositoryError};
use thiserror::Error;

use super::CommandError;

/// Errors that can occur while changing a role.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// No account uses the email.
    #[error("No user with email: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Repository(RepositoryError),
}

/// Set the role of the account with `email`.
///
/// # Errors
///
/// Returns `UserError::InvalidEmail` for a malformed address and
/// `UserError::NotFound` if no account uses it.
pub async fn set_role(email: &str, role: Role) -> Result<(), UserError> {
    let email = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;
    let backend = PgBackend::new(super::connect().await?);

    backend.set_role(&email, role).await.map_err(|e| match e {
        RepositoryError::NotFound => UserError::NotFound(email.to_string()),
        other => UserError::Repository(other),
    })?;

    tracing::info!(email = %email, role = role.as_str(), "Role updated");
    Ok(())
}
