//! Local user identity storage for iap-gate.
//!
//! Users authenticated by the identity-aware proxy are mirrored into a local
//! store so that the rest of the application can attach permissions to them.
//! Two implementations of [`UserStore`] are provided:
//!
//! - [`MemoryStore`]: process-local, for tests and ephemeral deployments
//! - [`RocksStore`]: persistent, backed by `RocksDB` with a username index
//!
//! # Example
//!
//! ```
//! use iap_gate_store::{MemoryStore, UserStore};
//!
//! let store = MemoryStore::new();
//! let (user, created) = store.get_or_create("a@x.com", "a@x.com").unwrap();
//! assert!(created);
//!
//! let (again, created) = store.get_or_create("a@x.com", "a@x.com").unwrap();
//! assert!(!created);
//! assert_eq!(again.id, user.id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use types::LocalIdentity;

use iap_gate_core::UserId;

/// The storage trait for local user identities.
///
/// Implementations must make `get_or_create` atomic with respect to other
/// calls on the same store, so concurrent first logins of one user never
/// produce two records.
pub trait UserStore: Send + Sync {
    /// Look up the user with this username and email, creating it if absent.
    ///
    /// Returns the record and whether it was created by this call.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the username exists with a different
    /// email, or an error if the database operation fails.
    fn get_or_create(&self, username: &str, email: &str) -> Result<(LocalIdentity, bool)>;

    /// Persist an updated user record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user was never created.
    fn save(&self, user: &LocalIdentity) -> Result<()>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_by_id(&self, user_id: &UserId) -> Result<Option<LocalIdentity>>;
}

impl<T: UserStore + ?Sized> UserStore for std::sync::Arc<T> {
    fn get_or_create(&self, username: &str, email: &str) -> Result<(LocalIdentity, bool)> {
        (**self).get_or_create(username, email)
    }

    fn save(&self, user: &LocalIdentity) -> Result<()> {
        (**self).save(user)
    }

    fn get_by_id(&self, user_id: &UserId) -> Result<Option<LocalIdentity>> {
        (**self).get_by_id(user_id)
    }
}
