//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `UserStore` trait.

use std::path::Path;
use std::sync::Arc;

use iap_gate_core::UserId;
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::types::LocalIdentity;
use crate::UserStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-modify-write sequences on the username index.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Resolve a username to its owning user id via the index.
    fn lookup_username(&self, username: &str) -> Result<Option<UserId>> {
        let cf = self.cf(cf::USERS_BY_USERNAME)?;

        let Some(value) = self
            .db
            .get_cf(&cf, keys::username_key(username))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        keys::decode_user_id(&value)
            .map(Some)
            .ok_or_else(|| StoreError::Serialization("corrupt username index entry".to_string()))
    }

    /// Write the user record and its username index entry atomically.
    fn put_user(&self, user: &LocalIdentity) -> Result<()> {
        let cf_users = self.cf(cf::USERS)?;
        let cf_by_username = self.cf(cf::USERS_BY_USERNAME)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_users, keys::user_key(&user.id), Self::serialize(user)?);
        batch.put_cf(
            &cf_by_username,
            keys::username_key(&user.username),
            keys::user_key(&user.id),
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl UserStore for RocksStore {
    fn get_or_create(&self, username: &str, email: &str) -> Result<(LocalIdentity, bool)> {
        let _guard = self.write_lock.lock();

        if let Some(user_id) = self.lookup_username(username)? {
            let user = self.get_by_id(&user_id)?.ok_or(StoreError::NotFound)?;
            if user.email != email {
                return Err(StoreError::Conflict(username.to_string()));
            }
            return Ok((user, false));
        }

        let user = LocalIdentity::new(username, email);
        self.put_user(&user)?;
        tracing::debug!(user_id = %user.id, username = %user.username, "Created user");

        Ok((user, true))
    }

    fn save(&self, user: &LocalIdentity) -> Result<()> {
        let _guard = self.write_lock.lock();

        if self.get_by_id(&user.id)?.is_none() {
            return Err(StoreError::NotFound);
        }
        match self.lookup_username(&user.username)? {
            Some(owner) if owner != user.id => {
                return Err(StoreError::Conflict(user.username.clone()));
            }
            _ => {}
        }

        self.put_user(user)
    }

    fn get_by_id(&self, user_id: &UserId) -> Result<Option<LocalIdentity>> {
        let cf = self.cf(cf::USERS)?;
        let key = keys::user_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }
}
