//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use shopkeep_core::{Email, UserId};

/// Session-stored user identity.
///
/// The role is not stored here. Admin checks re-read it on every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurrentUser {
    /// Profile ID.
    pub id: UserId,
    /// User's email address.
    pub email: Email,
    /// Display name.
    pub full_name: String,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
