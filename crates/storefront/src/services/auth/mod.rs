//! Authentication service.
//!
//! Email and password accounts with argon2id hashes. A successful login or
//! registration yields the [`CurrentUser`] that the handler stores in the
//! session.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use shopkeep_core::Email;

use crate::db::{Backend, RepositoryError};
use crate::models::{CurrentUser, NewAccount};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication service.
pub struct AuthService<'a> {
    backend: &'a dyn Backend,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Register a new account with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[tracing::instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        full_name: &str,
        password: &str,
    ) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email)?;
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(AuthError::MissingName);
        }
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let profile = self
            .backend
            .create_account(NewAccount {
                email,
                full_name: full_name.to_owned(),
                password_hash,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %profile.id, "Account created");

        Ok(CurrentUser {
            id: profile.id,
            email: profile.email,
            full_name: profile.full_name,
        })
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[tracing::instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email)?;

        let credentials = self
            .backend
            .get_credentials(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &credentials.password_hash)?;

        Ok(CurrentUser {
            id: credentials.user_id,
            email: credentials.email,
            full_name: credentials.full_name,
        })
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong horse", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_garbage_hash_is_invalid_credentials() {
        assert!(matches!(
            verify_password("anything", "not-a-phc-string"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);

        let registered = auth
            .register("Shopper@Example.com", "Sam Shopper", "password123")
            .await
            .unwrap();
        assert_eq!(registered.email.as_str(), "shopper@example.com");

        let logged_in = auth
            .login("shopper@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(logged_in.id, registered.id);
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);
        assert!(matches!(
            auth.register("a@example.com", "A", "short").await,
            Err(AuthError::WeakPassword(_))
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);
        auth.register("a@example.com", "A", "password123")
            .await
            .unwrap();
        assert!(matches!(
            auth.register("a@example.com", "B", "password123").await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let backend = MemoryBackend::new();
        let auth = AuthService::new(&backend);
        assert!(matches!(
            auth.login("nobody@example.com", "password123").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
