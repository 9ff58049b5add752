//! Domain types stored in the database.

use chrono::{DateTime, Utc};
use iap_gate_core::UserId;
use serde::{Deserialize, Serialize};

/// A local user record derived from a verified identity assertion.
///
/// `username` is unique across the store. The staff and superuser flags are
/// only ever promoted by the authentication layer, never demoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Unique identifier for the user.
    pub id: UserId,
    /// Unique username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Whether the user may access staff-only areas.
    pub is_staff: bool,
    /// Whether the user has every permission.
    pub is_superuser: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl LocalIdentity {
    /// Create a new unprivileged identity with a fresh id.
    #[must_use]
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            username: username.into(),
            email: email.into(),
            is_staff: false,
            is_superuser: false,
            created_at: now,
            updated_at: now,
        }
    }
}
