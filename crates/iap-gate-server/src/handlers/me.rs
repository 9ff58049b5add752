//! Current-user endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use iap_gate_auth::TokenVerifier;
use iap_gate_store::{LocalIdentity, UserStore};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::GatewayState;

/// The authenticated user's stored record.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Local user id.
    pub id: String,
    /// Local username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Staff flag.
    pub is_staff: bool,
    /// Superuser flag.
    pub is_superuser: bool,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 last modification time.
    pub updated_at: String,
}

impl From<LocalIdentity> for MeResponse {
    fn from(user: LocalIdentity) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.to_rfc3339(),
        }
    }
}

/// Return the record of the user bound to this request.
///
/// ```text
/// GET /v1/me
/// x-goog-iap-jwt-assertion: <token>
///
/// Response: 200 OK
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "username": "a@x.com",
///   "email": "a@x.com",
///   "is_staff": false,
///   "is_superuser": false,
///   ...
/// }
/// ```
pub async fn get_me<S, V>(
    State(state): State<Arc<GatewayState<S, V>>>,
    user: AuthUser,
) -> Result<Json<MeResponse>, ApiError>
where
    S: UserStore + 'static,
    V: TokenVerifier + 'static,
{
    let record = state
        .resolver
        .get_user(&user.user_id)?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", user.user_id)))?;

    Ok(Json(record.into()))
}
