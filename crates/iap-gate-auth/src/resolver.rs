//! Mapping verified claims to local users.

use std::collections::HashSet;

use chrono::Utc;
use iap_gate_core::UserId;
use iap_gate_store::{LocalIdentity, UserStore};

use crate::config::VerifierConfig;
use crate::error::{AuthError, Result};
use crate::jwt::VerifiedClaims;

/// Resolves verified claims to a [`LocalIdentity`], creating it on first
/// login and promoting it according to the configured allow-lists.
///
/// Promotion is one-way: removing a username from an allow-list does not
/// revoke a flag already granted.
pub struct IdentityResolver<S> {
    store: S,
    username_claim: String,
    email_claim: String,
    staff: HashSet<String>,
    superusers: HashSet<String>,
}

impl<S: UserStore> IdentityResolver<S> {
    /// Create a resolver over `store` using the claim mapping and
    /// allow-lists from `config`.
    #[must_use]
    pub fn new(store: S, config: &VerifierConfig) -> Self {
        Self {
            store,
            username_claim: config.username_field_from_claim.clone(),
            email_claim: config.email_field_from_claim.clone(),
            staff: config.users_is_staff.clone(),
            superusers: config.users_is_superuser.clone(),
        }
    }

    /// The underlying user store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Resolve `claims` to a local user.
    ///
    /// The store is written at most twice: once by `get_or_create` when the
    /// user is new, and once by `save` when a privilege flag is promoted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingClaims` if the username or email claim is
    /// absent or empty, or `AuthError::StoreUnavailable` if the store fails.
    pub fn resolve(&self, claims: &VerifiedClaims) -> Result<LocalIdentity> {
        let username = required_claim(claims, &self.username_claim)?;
        let email = required_claim(claims, &self.email_claim)?;

        let (mut user, created) = self.store.get_or_create(username, email)?;
        if created {
            tracing::info!(user_id = %user.id, username = %user.username, "Created local user");
        }

        if self.promote(&mut user) {
            user.updated_at = Utc::now();
            self.store.save(&user)?;
            tracing::info!(
                user_id = %user.id,
                username = %user.username,
                is_staff = user.is_staff,
                is_superuser = user.is_superuser,
                "Promoted user privileges"
            );
        }

        Ok(user)
    }

    /// Look up a previously resolved user by id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::StoreUnavailable` if the store fails.
    pub fn get_user(&self, user_id: &UserId) -> Result<Option<LocalIdentity>> {
        Ok(self.store.get_by_id(user_id)?)
    }

    /// Apply the allow-lists to `user`. Returns whether anything changed.
    fn promote(&self, user: &mut LocalIdentity) -> bool {
        let mut changed = false;

        if !user.is_staff && self.staff.contains(&user.username) {
            user.is_staff = true;
            changed = true;
        }
        if !user.is_superuser && self.superusers.contains(&user.username) {
            user.is_superuser = true;
            changed = true;
        }

        changed
    }
}

fn required_claim<'a>(claims: &'a VerifiedClaims, name: &str) -> Result<&'a str> {
    claims
        .claim(name)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AuthError::MissingClaims(name.to_string()))
}
