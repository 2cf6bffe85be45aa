//! Profile, password and managed-user repository.
//!
//! Account creation and deletion touch several tables and always run in a
//! single transaction.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shopkeep_core::{Email, Role, ShippingAddress, UserId, UserStatus};

use super::RepositoryError;
use crate::models::{Credentials, ManagedUser, NewAccount, Profile};

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: UserId,
    email: String,
    full_name: String,
    role: Role,
    street: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = RepositoryError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let email = parse_email(&row.email)?;
        let address = match (row.street, row.city, row.state, row.zip) {
            (Some(street), Some(city), Some(state), Some(zip)) => Some(ShippingAddress {
                street,
                city,
                state,
                zip,
            }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            email,
            full_name: row.full_name,
            role: row.role,
            address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ManagedUserRow {
    id: UserId,
    full_name: String,
    email: String,
    status: UserStatus,
    created_at: DateTime<Utc>,
}

impl TryFrom<ManagedUserRow> for ManagedUser {
    type Error = RepositoryError;

    fn try_from(row: ManagedUserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            full_name: row.full_name,
            email: parse_email(&row.email)?,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialsRow {
    id: UserId,
    email: String,
    full_name: String,
    password_hash: String,
}

fn parse_email(raw: &str) -> Result<Email, RepositoryError> {
    Email::parse(raw)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))
}

const PROFILE_COLUMNS: &str =
    "id, email, full_name, role, street, city, state, zip, created_at, updated_at";

/// Repository for account database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a profile with its password and managed-user rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_account(&self, account: NewAccount) -> Result<Profile, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let id = UserId::new_v4();

        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            r"
            INSERT INTO profiles (id, email, full_name, role)
            VALUES ($1, $2, $3, 'normal')
            RETURNING {PROFILE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(account.email.as_str())
        .bind(&account.full_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "email already exists"))?;

        sqlx::query("INSERT INTO user_passwords (user_id, password_hash) VALUES ($1, $2)")
            .bind(id)
            .bind(&account.password_hash)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO managed_users (id, full_name, email, status)
            VALUES ($1, $2, $3, 'active')
            ",
        )
        .bind(id)
        .bind(&account.full_name)
        .bind(account.email.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        row.try_into()
    }

    /// Get a profile by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_profile(&self, id: UserId) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Profile::try_from).transpose()
    }

    /// Read a profile's role.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the profile does not exist.
    pub async fn get_role(&self, id: UserId) -> Result<Role, RepositoryError> {
        sqlx::query_scalar::<_, Role>("SELECT role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// Get login material by email.
    ///
    /// Returns `None` if no account uses the email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<Credentials>, RepositoryError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            r"
            SELECT p.id, p.email, p.full_name, pw.password_hash
            FROM profiles p
            JOIN user_passwords pw ON pw.user_id = p.id
            WHERE p.email = $1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| {
            Ok(Credentials {
                user_id: r.id,
                email: parse_email(&r.email)?,
                full_name: r.full_name,
                password_hash: r.password_hash,
            })
        })
        .transpose()
    }

    /// Change the role of the profile with `email`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no profile uses the email.
    pub async fn set_role(&self, email: &Email, role: Role) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE profiles SET role = $2, updated_at = now() WHERE email = $1")
                .bind(email.as_str())
                .bind(role)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// List managed users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_managed(&self) -> Result<Vec<ManagedUser>, RepositoryError> {
        let rows = sqlx::query_as::<_, ManagedUserRow>(
            r"
            SELECT id, full_name, email, status, created_at
            FROM managed_users
            ORDER BY created_at DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(ManagedUser::try_from).collect()
    }

    /// Delete the managed-user row and then the profile, atomically.
    ///
    /// The profile delete cascades to the password, cart lines and orders.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the profile does not exist.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM managed_users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }
}
