//! Profile and managed-user domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shopkeep_core::{Email, Role, ShippingAddress, UserId, UserStatus};

/// A shopper or admin profile.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: UserId,
    pub email: Email,
    pub full_name: String,
    pub role: Role,
    /// Saved address used to prefill checkout.
    pub address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row of the admin user table.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedUser {
    /// Same as the profile ID.
    pub id: UserId,
    pub full_name: String,
    pub email: Email,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for account creation. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: Email,
    pub full_name: String,
    pub password_hash: String,
}

/// Stored login material for one account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: UserId,
    pub email: Email,
    pub full_name: String,
    pub password_hash: String,
}
