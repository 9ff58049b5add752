//! Key encoding utilities for `RocksDB`.

use iap_gate_core::UserId;

/// Encode a user key (the 16 UUID bytes).
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Encode a username index key.
#[must_use]
pub fn username_key(username: &str) -> Vec<u8> {
    username.as_bytes().to_vec()
}

/// Decode a user id stored as an index value.
///
/// Returns `None` if the value is not exactly 16 bytes.
#[must_use]
pub fn decode_user_id(value: &[u8]) -> Option<UserId> {
    let bytes: [u8; 16] = value.try_into().ok()?;
    Some(UserId::from_bytes(bytes))
}
