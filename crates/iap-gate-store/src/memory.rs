//! In-memory storage implementation.

use std::collections::HashMap;

use iap_gate_core::UserId;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::types::LocalIdentity;
use crate::UserStore;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, LocalIdentity>,
    by_username: HashMap<String, UserId>,
}

/// A process-local `UserStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().users.len()
    }

    /// Returns `true` if no users are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserStore for MemoryStore {
    fn get_or_create(&self, username: &str, email: &str) -> Result<(LocalIdentity, bool)> {
        let mut inner = self.inner.write();

        if let Some(id) = inner.by_username.get(username) {
            let user = inner.users.get(id).ok_or(StoreError::NotFound)?;
            if user.email != email {
                return Err(StoreError::Conflict(username.to_string()));
            }
            return Ok((user.clone(), false));
        }

        let user = LocalIdentity::new(username, email);
        inner.by_username.insert(user.username.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        tracing::debug!(user_id = %user.id, username = %user.username, "Created user");

        Ok((user, true))
    }

    fn save(&self, user: &LocalIdentity) -> Result<()> {
        let mut inner = self.inner.write();

        if !inner.users.contains_key(&user.id) {
            return Err(StoreError::NotFound);
        }
        match inner.by_username.get(&user.username) {
            Some(owner) if *owner != user.id => {
                return Err(StoreError::Conflict(user.username.clone()));
            }
            _ => {}
        }

        inner.by_username.insert(user.username.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    fn get_by_id(&self, user_id: &UserId) -> Result<Option<LocalIdentity>> {
        Ok(self.inner.read().users.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let store = MemoryStore::new();

        let (first, created) = store.get_or_create("a@x.com", "a@x.com").unwrap();
        assert!(created);
        let (second, created) = store.get_or_create("a@x.com", "a@x.com").unwrap();
        assert!(!created);

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_create_conflicting_email() {
        let store = MemoryStore::new();
        store.get_or_create("alice", "alice@x.com").unwrap();

        let result = store.get_or_create("alice", "other@x.com");
        assert!(matches!(result, Err(StoreError::Conflict(name)) if name == "alice"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_and_get() {
        let store = MemoryStore::new();
        let (mut user, _) = store.get_or_create("a@x.com", "a@x.com").unwrap();

        user.is_staff = true;
        store.save(&user).unwrap();

        let loaded = store.get_by_id(&user.id).unwrap().unwrap();
        assert!(loaded.is_staff);
    }

    #[test]
    fn save_unknown_user_fails() {
        let store = MemoryStore::new();
        let user = LocalIdentity::new("ghost", "ghost@x.com");
        assert!(matches!(store.save(&user), Err(StoreError::NotFound)));
        assert!(store.is_empty());
    }

    #[test]
    fn get_missing_user() {
        let store = MemoryStore::new();
        assert!(store.get_by_id(&UserId::generate()).unwrap().is_none());
    }
}
